//! Dependency cycle detection.
//!
//! A cycle is an SCC with more than one member. For each one we report the
//! sorted member ids plus one concrete simple cycle, found by an iterative
//! DFS restricted to the component that starts and ends at its smallest id.

use drvgraph_core::model::NodeId;
use drvgraph_core::{AnalysisContext, Result};
use fixedbitset::FixedBitSet;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::cache::{AnalysisCache, AnalysisKind};
use crate::graph::{GraphSnapshot, SccPartition};

/// One strongly connected component of size > 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleInfo {
    /// Member ids, ascending.
    pub node_ids: Vec<NodeId>,
    pub size: usize,
    /// A simple cycle through the component: starts at the smallest member
    /// id and returns to it, so `path.first() == path.last()`.
    pub path: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopReport {
    pub cycle_count: usize,
    /// Sorted by member ids.
    pub cycles: Vec<CycleInfo>,
    pub has_cycles: bool,
}

/// Find every cycle in `snapshot`.
#[must_use]
pub fn find_loops(snapshot: &GraphSnapshot) -> LoopReport {
    let partition = SccPartition::compute(&snapshot.graph);
    find_loops_with(snapshot, &partition)
}

/// Like [`find_loops`], reusing an already computed partition.
#[must_use]
#[instrument(skip_all, fields(import_id = snapshot.import_id))]
pub fn find_loops_with(snapshot: &GraphSnapshot, partition: &SccPartition) -> LoopReport {
    let mut cycles: Vec<CycleInfo> = partition
        .cyclic_components()
        .map(|component| {
            let members = &partition.components[component];
            let mut node_ids: Vec<NodeId> =
                members.iter().map(|&idx| snapshot.node_id(idx)).collect();
            node_ids.sort_unstable();

            let path = cycle_path(snapshot, partition, component)
                .into_iter()
                .map(|idx| snapshot.node_id(idx))
                .collect();

            CycleInfo {
                size: node_ids.len(),
                node_ids,
                path,
            }
        })
        .collect();

    cycles.sort_unstable_by(|a, b| a.node_ids.cmp(&b.node_ids));

    LoopReport {
        cycle_count: cycles.len(),
        has_cycles: !cycles.is_empty(),
        cycles,
    }
}

/// Cycle report for a snapshot, served from the analysis cache when the
/// stored entry matches the snapshot's content hash.
#[instrument(skip(ctx, snapshot), fields(import_id = snapshot.import_id))]
pub fn loops_for_import(ctx: &AnalysisContext<'_>, snapshot: &GraphSnapshot) -> Result<LoopReport> {
    let cache = AnalysisCache::new(ctx);
    let cached = cache.get_or_compute(
        snapshot.import_id,
        &AnalysisKind::Loops,
        &snapshot.content_hash,
        || Ok(find_loops(snapshot)),
    )?;
    debug!(cycles = cached.payload.cycle_count, "loop report ready");
    Ok(cached.payload)
}

/// Walk from the smallest member of `component` until an edge leads back to
/// it. The DFS stack is always a path from the start, so the first edge back
/// to the start closes a simple cycle.
fn cycle_path(
    snapshot: &GraphSnapshot,
    partition: &SccPartition,
    component: usize,
) -> Vec<NodeIndex> {
    let members = &partition.components[component];
    let Some(&start) = members.iter().min_by_key(|&&idx| snapshot.node_id(idx)) else {
        return Vec::new();
    };

    let within = |idx: NodeIndex| -> Vec<NodeIndex> {
        snapshot
            .successors(idx)
            .into_iter()
            .filter(|&next| partition.component_of(next) == component)
            .collect()
    };

    let mut visited = FixedBitSet::with_capacity(snapshot.node_count());
    visited.insert(start.index());
    let mut frames: Vec<(NodeIndex, std::vec::IntoIter<NodeIndex>)> =
        vec![(start, within(start).into_iter())];

    while let Some(frame) = frames.last_mut() {
        let Some(next) = frame.1.next() else {
            frames.pop();
            continue;
        };
        if next == start {
            let mut path: Vec<NodeIndex> = frames.iter().map(|(idx, _)| *idx).collect();
            path.push(start);
            return path;
        }
        if !visited.contains(next.index()) {
            visited.insert(next.index());
            frames.push((next, within(next).into_iter()));
        }
    }

    // Unreachable for a strongly connected component.
    vec![start, start]
}
