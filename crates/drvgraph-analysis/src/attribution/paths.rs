//! Reverse path search from a target to its top-level ancestors.
//!
//! The search walks incoming edges from the target with an explicit frame
//! stack, enumerating simple paths that end at a top-level node. Reaching a
//! top-level node records a path but does not end the walk: a top-level
//! package that depends on another one is reported through it as well. Two
//! bounds keep it practical on wide graphs:
//!
//! - `max_depth` edges per path. A forward BFS from every top-level node
//!   gives each node its distance from the nearest one; a predecessor whose
//!   distance cannot fit in the remaining budget is not entered.
//! - `max_paths` paths in total.
//!
//! Either bound cutting off a path it could have produced marks the search
//! `truncated`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use drvgraph_core::Result;
use drvgraph_core::model::NodeId;
use fixedbitset::FixedBitSet;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::graph::GraphSnapshot;

/// One attribution path, top-level node first, target last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionPath {
    pub node_ids: Vec<NodeId>,
}

impl AttributionPath {
    #[must_use]
    pub fn top_level_id(&self) -> Option<NodeId> {
        self.node_ids.first().copied()
    }

    #[must_use]
    pub fn target_id(&self) -> Option<NodeId> {
        self.node_ids.last().copied()
    }

    /// The node adjacent to the target; the target itself for a trivial path.
    #[must_use]
    pub fn via_node_id(&self) -> Option<NodeId> {
        match self.node_ids.len() {
            0 => None,
            1 => self.node_ids.first().copied(),
            len => self.node_ids.get(len - 2).copied(),
        }
    }

    /// Number of edges on the path.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.node_ids.len().saturating_sub(1)
    }

    #[must_use]
    pub fn is_trivial(&self) -> bool {
        self.node_ids.len() == 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSearch {
    pub target_id: NodeId,
    /// In discovery order: predecessors are explored by ascending id.
    pub paths: Vec<AttributionPath>,
    pub max_depth: usize,
    pub max_paths: usize,
    pub truncated: bool,
}

/// Paths from `target_id` up to the top-level nodes that pull it in.
///
/// # Errors
///
/// [`drvgraph_core::Error::NodeNotFound`] if the target is not part of the
/// snapshot.
#[instrument(skip(snapshot), fields(import_id = snapshot.import_id))]
pub fn find_paths_to_node(
    snapshot: &GraphSnapshot,
    target_id: NodeId,
    max_depth: usize,
    max_paths: usize,
) -> Result<PathSearch> {
    let target = snapshot.require_node(target_id)?;
    let mut search = PathSearch {
        target_id,
        paths: Vec::new(),
        max_depth,
        max_paths,
        truncated: false,
    };

    if snapshot.is_top_level(target) {
        if max_paths == 0 {
            search.truncated = true;
            return Ok(search);
        }
        search.paths.push(AttributionPath {
            node_ids: vec![target_id],
        });
    }

    let dist_from_top = distance_from_top_level(snapshot);
    let mut on_path = FixedBitSet::with_capacity(snapshot.node_count());
    on_path.insert(target.index());
    let mut frames: Vec<(NodeIndex, std::vec::IntoIter<NodeIndex>)> =
        vec![(target, snapshot.predecessors(target).into_iter())];

    'search: while let Some(frame) = frames.last_mut() {
        let Some(pred) = frame.1.next() else {
            if let Some((done, _)) = frames.pop() {
                on_path.set(done.index(), false);
            }
            continue;
        };
        if on_path.contains(pred.index()) {
            continue;
        }

        // Edges on the path once `pred` is added.
        let path_edges = frames.len();
        let Some(remaining) = dist_from_top[pred.index()] else {
            continue;
        };
        if path_edges + remaining > max_depth {
            search.truncated = true;
            continue;
        }

        if snapshot.is_top_level(pred) {
            if search.paths.len() == max_paths {
                search.truncated = true;
                break 'search;
            }
            let mut node_ids = Vec::with_capacity(frames.len() + 1);
            node_ids.push(snapshot.node_id(pred));
            node_ids.extend(frames.iter().rev().map(|(idx, _)| snapshot.node_id(*idx)));
            search.paths.push(AttributionPath { node_ids });
        }

        on_path.insert(pred.index());
        frames.push((pred, snapshot.predecessors(pred).into_iter()));
    }

    if search.truncated {
        warn!(target_id, found = search.paths.len(), "attribution search truncated");
    }
    debug!(target_id, paths = search.paths.len(), "attribution search finished");
    Ok(search)
}

/// Hop distance from the nearest top-level node, following dependency edges.
fn distance_from_top_level(snapshot: &GraphSnapshot) -> Vec<Option<usize>> {
    let mut dist: Vec<Option<usize>> = vec![None; snapshot.node_count()];
    let mut queue = VecDeque::new();
    for top in snapshot.top_level_nodes() {
        dist[top.index()] = Some(0);
        queue.push_back(top);
    }
    while let Some(current) = queue.pop_front() {
        let next_dist = dist[current.index()].map_or(0, |d| d + 1);
        for next in snapshot.graph.neighbors(current) {
            if dist[next.index()].is_none() {
                dist[next.index()] = Some(next_dist);
                queue.push_back(next);
            }
        }
    }
    dist
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Paths grouped by the node that links them to the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionGroup {
    pub via_node_id: NodeId,
    pub via_label: String,
    /// Ascending.
    pub top_level_ids: Vec<NodeId>,
    /// Labels matching `top_level_ids` position by position.
    pub top_level_labels: Vec<String>,
    pub path_count: usize,
}

/// Group paths by via node. Groups come out by descending number of
/// top-level nodes, then ascending via id.
#[must_use]
pub fn aggregate_paths(snapshot: &GraphSnapshot, paths: &[AttributionPath]) -> Vec<AttributionGroup> {
    let mut by_via: BTreeMap<NodeId, (BTreeSet<NodeId>, usize)> = BTreeMap::new();
    for path in paths {
        let (Some(via), Some(top)) = (path.via_node_id(), path.top_level_id()) else {
            continue;
        };
        let entry = by_via.entry(via).or_default();
        entry.0.insert(top);
        entry.1 += 1;
    }

    let label_of = |node_id: NodeId| {
        snapshot
            .node_index(node_id)
            .map(|idx| snapshot.node(idx).label.clone())
            .unwrap_or_default()
    };

    let mut groups: Vec<AttributionGroup> = by_via
        .into_iter()
        .map(|(via, (tops, path_count))| {
            let top_level_ids: Vec<NodeId> = tops.into_iter().collect();
            AttributionGroup {
                via_node_id: via,
                via_label: label_of(via),
                top_level_labels: top_level_ids.iter().map(|&id| label_of(id)).collect(),
                top_level_ids,
                path_count,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        b.top_level_ids
            .len()
            .cmp(&a.top_level_ids.len())
            .then(a.via_node_id.cmp(&b.via_node_id))
    });
    groups
}
