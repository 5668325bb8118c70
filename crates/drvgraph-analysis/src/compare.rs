//! Cross-import comparison.
//!
//! Nodes are matched by content key (`drv_hash`) first; a shared key means
//! the same derivation. What is left is grouped by label and classified:
//!
//! | left leftovers | right leftovers | label hash sets      | outcome                         |
//! |----------------|-----------------|----------------------|---------------------------------|
//! | some           | none            | n/a                  | `ONLY_LEFT` per node            |
//! | none           | some            | n/a                  | `ONLY_RIGHT` per node           |
//! | some           | some            | overlapping          | one `DIFFERENT_HASH`            |
//! | one            | one             | disjoint             | one `DIFFERENT_HASH`            |
//! | some           | some            | disjoint, many       | `ONLY_LEFT` / `ONLY_RIGHT` each |
//!
//! Results are cached once per unordered pair, owned by the smaller import
//! id; a request in the other direction gets the stored result flipped.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use drvgraph_core::model::{ImportId, NodeId};
use drvgraph_core::{AnalysisContext, Result};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::cache::{AnalysisCache, AnalysisKind};
use crate::depth::{ClosureSizes, compute_closure_sizes};
use crate::graph::GraphSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffType {
    Same,
    DifferentHash,
    OnlyLeft,
    OnlyRight,
}

impl DiffType {
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::OnlyLeft => Self::OnlyRight,
            Self::OnlyRight => Self::OnlyLeft,
            other => other,
        }
    }
}

/// One difference between the two imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDiff {
    pub label: String,
    pub diff_type: DiffType,
    pub left_node_ids: Vec<NodeId>,
    pub right_node_ids: Vec<NodeId>,
    pub left_hashes: Vec<String>,
    pub right_hashes: Vec<String>,
    /// Closure size on the right minus closure size on the left.
    pub closure_delta: i64,
}

impl NodeDiff {
    fn flipped(self) -> Self {
        Self {
            label: self.label,
            diff_type: self.diff_type.flipped(),
            left_node_ids: self.right_node_ids,
            right_node_ids: self.left_node_ids,
            left_hashes: self.right_hashes,
            right_hashes: self.left_hashes,
            closure_delta: -self.closure_delta,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportComparison {
    pub left_import_id: ImportId,
    pub right_import_id: ImportId,
    pub left_total: usize,
    pub right_total: usize,
    /// Nodes matched by content key.
    pub same_count: usize,
    /// `DIFFERENT_HASH` entries.
    pub different_count: usize,
    pub left_only_count: usize,
    pub right_only_count: usize,
    /// Bound applied to the two impact lists.
    pub top_n: usize,
    /// Sorted by label, then diff type, then first node id.
    pub differences: Vec<NodeDiff>,
    /// Largest positive closure deltas, descending.
    pub largest_additions: Vec<NodeDiff>,
    /// Largest negative closure deltas, most negative first.
    pub largest_removals: Vec<NodeDiff>,
}

impl ImportComparison {
    /// The same comparison seen from the other side.
    #[must_use]
    pub fn flip(self) -> Self {
        let mut differences: Vec<NodeDiff> =
            self.differences.into_iter().map(NodeDiff::flipped).collect();
        sort_differences(&mut differences);
        Self {
            left_import_id: self.right_import_id,
            right_import_id: self.left_import_id,
            left_total: self.right_total,
            right_total: self.left_total,
            same_count: self.same_count,
            different_count: self.different_count,
            left_only_count: self.right_only_count,
            right_only_count: self.left_only_count,
            top_n: self.top_n,
            differences,
            largest_additions: self.largest_removals.into_iter().map(NodeDiff::flipped).collect(),
            largest_removals: self.largest_additions.into_iter().map(NodeDiff::flipped).collect(),
        }
    }
}

/// Compare two snapshots whose closure sizes are already known.
#[must_use]
pub fn compare_snapshots(
    left: &GraphSnapshot,
    right: &GraphSnapshot,
    left_closures: &ClosureSizes,
    right_closures: &ClosureSizes,
    top_n: usize,
) -> ImportComparison {
    let right_by_hash: HashMap<&str, NodeIndex> = right
        .graph
        .node_indices()
        .map(|idx| (right.node(idx).drv_hash.as_str(), idx))
        .collect();

    let mut same_count = 0;
    let mut matched_right: BTreeSet<NodeIndex> = BTreeSet::new();
    let mut left_rest: BTreeMap<&str, Vec<NodeIndex>> = BTreeMap::new();
    for idx in left.graph.node_indices() {
        let node = left.node(idx);
        if let Some(&other) = right_by_hash.get(node.drv_hash.as_str()) {
            same_count += 1;
            matched_right.insert(other);
        } else {
            left_rest.entry(node.label.as_str()).or_default().push(idx);
        }
    }

    let mut right_rest: BTreeMap<&str, Vec<NodeIndex>> = BTreeMap::new();
    for idx in right.graph.node_indices() {
        if !matched_right.contains(&idx) {
            right_rest.entry(right.node(idx).label.as_str()).or_default().push(idx);
        }
    }

    let left_label_hashes = hashes_by_label(left);
    let right_label_hashes = hashes_by_label(right);

    let closure_of = |snapshot: &GraphSnapshot, closures: &ClosureSizes, idx: NodeIndex| {
        i64::try_from(closures.get(snapshot.node_id(idx)).unwrap_or(0)).unwrap_or(i64::MAX)
    };
    let side = |snapshot: &GraphSnapshot, nodes: &[NodeIndex]| -> (Vec<NodeId>, Vec<String>) {
        nodes
            .iter()
            .map(|&idx| (snapshot.node_id(idx), snapshot.node(idx).drv_hash.clone()))
            .unzip()
    };

    let labels: BTreeSet<&str> = left_rest.keys().chain(right_rest.keys()).copied().collect();
    let mut differences: Vec<NodeDiff> = Vec::new();
    for label in labels {
        let rl = left_rest.get(label).map_or(&[][..], Vec::as_slice);
        let rr = right_rest.get(label).map_or(&[][..], Vec::as_slice);

        let overlapping = match (left_label_hashes.get(label), right_label_hashes.get(label)) {
            (Some(hl), Some(hr)) => !hl.is_disjoint(hr),
            _ => false,
        };
        let one_variant_each = rl.len() == 1 && rr.len() == 1;

        if !rl.is_empty() && !rr.is_empty() && (overlapping || one_variant_each) {
            let (left_node_ids, left_hashes) = side(left, rl);
            let (right_node_ids, right_hashes) = side(right, rr);
            let left_sum: i64 = rl.iter().map(|&idx| closure_of(left, left_closures, idx)).sum();
            let right_sum: i64 = rr.iter().map(|&idx| closure_of(right, right_closures, idx)).sum();
            differences.push(NodeDiff {
                label: label.to_string(),
                diff_type: DiffType::DifferentHash,
                left_node_ids,
                right_node_ids,
                left_hashes,
                right_hashes,
                closure_delta: right_sum - left_sum,
            });
            continue;
        }

        for &idx in rl {
            differences.push(NodeDiff {
                label: label.to_string(),
                diff_type: DiffType::OnlyLeft,
                left_node_ids: vec![left.node_id(idx)],
                right_node_ids: Vec::new(),
                left_hashes: vec![left.node(idx).drv_hash.clone()],
                right_hashes: Vec::new(),
                closure_delta: -closure_of(left, left_closures, idx),
            });
        }
        for &idx in rr {
            differences.push(NodeDiff {
                label: label.to_string(),
                diff_type: DiffType::OnlyRight,
                left_node_ids: Vec::new(),
                right_node_ids: vec![right.node_id(idx)],
                left_hashes: Vec::new(),
                right_hashes: vec![right.node(idx).drv_hash.clone()],
                closure_delta: closure_of(right, right_closures, idx),
            });
        }
    }

    sort_differences(&mut differences);

    let count = |ty: DiffType| differences.iter().filter(|d| d.diff_type == ty).count();
    let different_count = count(DiffType::DifferentHash);
    let left_only_count = count(DiffType::OnlyLeft);
    let right_only_count = count(DiffType::OnlyRight);

    let mut largest_additions: Vec<NodeDiff> = differences
        .iter()
        .filter(|d| d.closure_delta > 0)
        .cloned()
        .collect();
    largest_additions.sort_by(|a, b| b.closure_delta.cmp(&a.closure_delta).then(a.label.cmp(&b.label)));
    largest_additions.truncate(top_n);

    let mut largest_removals: Vec<NodeDiff> = differences
        .iter()
        .filter(|d| d.closure_delta < 0)
        .cloned()
        .collect();
    largest_removals.sort_by(|a, b| a.closure_delta.cmp(&b.closure_delta).then(a.label.cmp(&b.label)));
    largest_removals.truncate(top_n);

    ImportComparison {
        left_import_id: left.import_id,
        right_import_id: right.import_id,
        left_total: left.node_count(),
        right_total: right.node_count(),
        same_count,
        different_count,
        left_only_count,
        right_only_count,
        top_n,
        differences,
        largest_additions,
        largest_removals,
    }
}

/// Compare two imports from the store.
///
/// The result is cached under the smaller import id with kind
/// `compare:<larger id>`, keyed to both snapshots' content hashes.
#[instrument(skip(ctx))]
pub fn compare_imports(
    ctx: &AnalysisContext<'_>,
    left_import_id: ImportId,
    right_import_id: ImportId,
) -> Result<ImportComparison> {
    let (owner, other) = if left_import_id <= right_import_id {
        (left_import_id, right_import_id)
    } else {
        (right_import_id, left_import_id)
    };
    let reversed = owner != left_import_id;

    let owner_snapshot = GraphSnapshot::load(ctx, owner)?;
    let other_snapshot = if other == owner {
        owner_snapshot.clone()
    } else {
        GraphSnapshot::load(ctx, other)?
    };
    let pair_hash = pair_hash(&owner_snapshot.content_hash, &other_snapshot.content_hash);
    let top_n = ctx.config().comparison.top_n;

    let cache = AnalysisCache::new(ctx);
    let kind = AnalysisKind::Compare(other);
    let stored = match cache.get_fresh::<ImportComparison>(owner, &kind, &pair_hash)? {
        Some(hit) if hit.payload.top_n == top_n => {
            debug!(owner, other, "comparison served from cache");
            hit.payload
        }
        _ => {
            let comparison = compare_snapshots(
                &owner_snapshot,
                &other_snapshot,
                &compute_closure_sizes(&owner_snapshot),
                &compute_closure_sizes(&other_snapshot),
                top_n,
            );
            cache.put(owner, &kind, &comparison, &pair_hash)?;
            comparison
        }
    };

    debug!(
        same = stored.same_count,
        different = stored.different_count,
        reversed,
        "comparison ready"
    );
    Ok(if reversed { stored.flip() } else { stored })
}

fn hashes_by_label(snapshot: &GraphSnapshot) -> HashMap<&str, BTreeSet<&str>> {
    let mut map: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for node in snapshot.graph.node_weights() {
        map.entry(node.label.as_str())
            .or_default()
            .insert(node.drv_hash.as_str());
    }
    map
}

fn sort_differences(differences: &mut [NodeDiff]) {
    differences.sort_by(|a, b| {
        a.label
            .cmp(&b.label)
            .then(a.diff_type.cmp(&b.diff_type))
            .then_with(|| first_id(a).cmp(&first_id(b)))
    });
}

fn first_id(diff: &NodeDiff) -> NodeId {
    diff.left_node_ids
        .first()
        .or_else(|| diff.right_node_ids.first())
        .copied()
        .unwrap_or_default()
}

fn pair_hash(owner: &str, other: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(owner.as_bytes());
    hasher.update(b"\x00");
    hasher.update(other.as_bytes());
    format!("blake3:{}", hasher.finalize())
}
