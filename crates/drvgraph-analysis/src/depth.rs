//! Depth and closure size.
//!
//! # Depth
//!
//! Multi-source BFS from the roots: nodes without dependents plus every
//! top-level node. Roots sit at depth 0; everything else gets its shortest
//! hop count, and nodes no root reaches get `None`.
//!
//! # Closure size
//!
//! The number of distinct nodes reachable through outgoing edges, excluding
//! the node itself. Computed on the SCC condensation: components are swept
//! sinks first, each taking the union of its children's node sets as a
//! [`FixedBitSet`]. A child's set is dropped as soon as its last parent has
//! consumed it, which keeps peak memory near the width of the DAG rather than
//! its size. Members of a cyclic component reach each other, so they add
//! `|component| - 1` on top of the shared downstream set.

use std::collections::{BTreeMap, VecDeque};

use drvgraph_core::db::write::{self, DerivedFields};
use drvgraph_core::model::NodeId;
use drvgraph_core::{AnalysisContext, Result};
use fixedbitset::FixedBitSet;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::cache::{AnalysisCache, AnalysisKind};
use crate::graph::{GraphSnapshot, SccPartition};

// ---------------------------------------------------------------------------
// Depth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthMap {
    /// Roots the BFS started from, ascending.
    pub roots: Vec<NodeId>,
    /// Depth per node; `None` for nodes no root reaches.
    pub depths: BTreeMap<NodeId, Option<u32>>,
    pub max_depth: Option<u32>,
    pub unreachable_count: usize,
}

impl DepthMap {
    #[must_use]
    pub fn depth(&self, node_id: NodeId) -> Option<u32> {
        self.depths.get(&node_id).copied().flatten()
    }
}

/// BFS depth of every node of `snapshot`.
#[must_use]
#[instrument(skip_all, fields(import_id = snapshot.import_id))]
pub fn compute_depths(snapshot: &GraphSnapshot) -> DepthMap {
    let roots = snapshot.roots();
    let by_index = depths_by_index(snapshot, &roots);

    let depths: BTreeMap<NodeId, Option<u32>> = snapshot
        .graph
        .node_indices()
        .map(|idx| (snapshot.node_id(idx), by_index[idx.index()]))
        .collect();

    DepthMap {
        roots: roots.iter().map(|&idx| snapshot.node_id(idx)).collect(),
        max_depth: by_index.iter().flatten().copied().max(),
        unreachable_count: by_index.iter().filter(|depth| depth.is_none()).count(),
        depths,
    }
}

fn depths_by_index(snapshot: &GraphSnapshot, roots: &[NodeIndex]) -> Vec<Option<u32>> {
    let mut depth: Vec<Option<u32>> = vec![None; snapshot.node_count()];
    let mut queue = VecDeque::with_capacity(roots.len());
    for &root in roots {
        depth[root.index()] = Some(0);
        queue.push_back(root);
    }

    while let Some(current) = queue.pop_front() {
        let next_depth = depth[current.index()].map_or(0, |d| d.saturating_add(1));
        for next in snapshot.graph.neighbors(current) {
            if depth[next.index()].is_none() {
                depth[next.index()] = Some(next_depth);
                queue.push_back(next);
            }
        }
    }

    depth
}

// ---------------------------------------------------------------------------
// Closure size
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClosureSizes {
    pub sizes: BTreeMap<NodeId, u64>,
}

impl ClosureSizes {
    #[must_use]
    pub fn get(&self, node_id: NodeId) -> Option<u64> {
        self.sizes.get(&node_id).copied()
    }

    /// Largest closure and its node; ties go to the smaller id.
    #[must_use]
    pub fn largest(&self) -> Option<(NodeId, u64)> {
        self.sizes
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(&id, &size)| (id, size))
    }
}

/// Closure size of every node of `snapshot`.
#[must_use]
pub fn compute_closure_sizes(snapshot: &GraphSnapshot) -> ClosureSizes {
    let partition = SccPartition::compute(&snapshot.graph);
    compute_closure_sizes_with(snapshot, &partition)
}

/// Like [`compute_closure_sizes`], reusing an already computed partition.
#[must_use]
#[instrument(skip_all, fields(import_id = snapshot.import_id))]
pub fn compute_closure_sizes_with(snapshot: &GraphSnapshot, partition: &SccPartition) -> ClosureSizes {
    let by_index = closure_by_index(snapshot, partition);
    ClosureSizes {
        sizes: snapshot
            .graph
            .node_indices()
            .map(|idx| (snapshot.node_id(idx), by_index[idx.index()]))
            .collect(),
    }
}

fn closure_by_index(snapshot: &GraphSnapshot, partition: &SccPartition) -> Vec<u64> {
    let n = snapshot.node_count();
    let children = partition.condensation(&snapshot.graph);

    let mut pending_parents = vec![0_usize; partition.len()];
    for list in &children {
        for &child in list {
            pending_parents[child] += 1;
        }
    }

    let mut reach: Vec<Option<FixedBitSet>> = vec![None; partition.len()];
    let mut sizes = vec![0_u64; n];
    let mut peak_live = 0_usize;
    let mut live = 0_usize;

    // Children always carry smaller component ids, so ascending order is a
    // valid sinks-first sweep.
    for (component, members) in partition.components.iter().enumerate() {
        let siblings = members.len() as u64 - 1;
        if children[component].is_empty() {
            // Sinks keep no set; parents pick up their members directly.
            for &member in members {
                sizes[member.index()] = siblings;
            }
            continue;
        }

        let mut set = FixedBitSet::with_capacity(n);
        for &child in &children[component] {
            for &member in &partition.components[child] {
                set.insert(member.index());
            }
            if let Some(child_set) = &reach[child] {
                set.union_with(child_set);
            }
            pending_parents[child] -= 1;
            if pending_parents[child] == 0 && reach[child].take().is_some() {
                live -= 1;
            }
        }

        let downstream = set.count_ones(..) as u64;
        for &member in members {
            sizes[member.index()] = downstream + siblings;
        }

        if pending_parents[component] > 0 {
            reach[component] = Some(set);
            live += 1;
            peak_live = peak_live.max(live);
        }
    }

    debug!(components = partition.len(), peak_live, "closure sweep finished");
    sizes
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Write depth and closure size for every node of the snapshot in one
/// transaction, and cache both maps.
#[instrument(skip_all, fields(import_id = snapshot.import_id))]
pub fn write_depths_and_closures(
    ctx: &AnalysisContext<'_>,
    snapshot: &GraphSnapshot,
    depths: &DepthMap,
    closures: &ClosureSizes,
) -> Result<usize> {
    let rows: Vec<DerivedFields> = snapshot
        .graph
        .node_weights()
        .map(|node| DerivedFields {
            node_id: node.id,
            depth: depths.depth(node.id),
            closure_size: closures.get(node.id).unwrap_or(0),
        })
        .collect();

    let updated = write::write_depths_and_closures(ctx.conn(), snapshot.import_id, &rows)?;

    let cache = AnalysisCache::new(ctx);
    cache.put(snapshot.import_id, &AnalysisKind::Depths, depths, &snapshot.content_hash)?;
    cache.put(
        snapshot.import_id,
        &AnalysisKind::ClosureSizes,
        closures,
        &snapshot.content_hash,
    )?;

    info!(updated, "depths and closure sizes written");
    Ok(updated)
}
