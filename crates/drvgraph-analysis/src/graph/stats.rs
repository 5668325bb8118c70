//! Summary statistics for an import's dependency graph.
//!
//! # Metrics
//!
//! - **density**: `edge_count / (node_count * (node_count - 1))`.
//!   An empty or single-node graph has density 0.0.
//! - **root_count**: nodes the depth BFS starts from (no dependents, or
//!   top-level).
//! - **leaf_count**: nodes with no dependencies.
//! - **isolated_count**: nodes with no edges at all.
//! - **scc_count**: strongly connected components. In an acyclic graph this
//!   equals `node_count`.
//! - **cycle_count**: SCCs with more than one member.
//! - **unreachable_count**: nodes without a depth (no root reaches them).

use drvgraph_core::{AnalysisContext, Result};
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::cache::{AnalysisCache, AnalysisKind};
use crate::depth::{DepthMap, compute_depths};
use crate::graph::{GraphSnapshot, SccPartition};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub node_count: usize,
    pub edge_count: usize,
    pub top_level_count: usize,
    pub root_count: usize,
    pub leaf_count: usize,
    pub isolated_count: usize,
    pub scc_count: usize,
    pub cycle_count: usize,
    /// Members of the largest SCC (1 when acyclic, 0 when empty).
    pub largest_scc: usize,
    pub max_depth: Option<u32>,
    pub unreachable_count: usize,
    pub density: f64,
    pub content_hash: String,
}

impl GraphSummary {
    /// Summarize a snapshot from its partition and depth map.
    #[must_use]
    pub fn compute(snapshot: &GraphSnapshot, partition: &SccPartition, depths: &DepthMap) -> Self {
        let graph = &snapshot.graph;
        let no_edges = |idx: NodeIndex, direction: Direction| graph.neighbors_directed(idx, direction).next().is_none();

        let leaf_count = graph
            .node_indices()
            .filter(|&idx| no_edges(idx, Direction::Outgoing))
            .count();
        let isolated_count = graph
            .node_indices()
            .filter(|&idx| no_edges(idx, Direction::Outgoing) && no_edges(idx, Direction::Incoming))
            .count();

        Self {
            node_count: snapshot.node_count(),
            edge_count: snapshot.edge_count(),
            top_level_count: snapshot.top_level_nodes().len(),
            root_count: depths.roots.len(),
            leaf_count,
            isolated_count,
            scc_count: partition.len(),
            cycle_count: partition.cyclic_components().count(),
            largest_scc: partition.largest(),
            max_depth: depths.max_depth,
            unreachable_count: depths.unreachable_count,
            density: compute_density(snapshot.node_count(), snapshot.edge_count()),
            content_hash: snapshot.content_hash.clone(),
        }
    }

    /// Summarize a snapshot from scratch.
    #[must_use]
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Self {
        let partition = SccPartition::compute(&snapshot.graph);
        Self::compute(snapshot, &partition, &compute_depths(snapshot))
    }
}

/// Cached summary for a snapshot.
#[instrument(skip_all, fields(import_id = snapshot.import_id))]
pub fn summary_for_import(ctx: &AnalysisContext<'_>, snapshot: &GraphSnapshot) -> Result<GraphSummary> {
    let cached = AnalysisCache::new(ctx).get_or_compute(
        snapshot.import_id,
        &AnalysisKind::Summary,
        &snapshot.content_hash,
        || Ok(GraphSummary::from_snapshot(snapshot)),
    )?;
    Ok(cached.payload)
}

#[allow(clippy::cast_precision_loss)]
fn compute_density(node_count: usize, edge_count: usize) -> f64 {
    if node_count < 2 {
        return 0.0;
    }
    edge_count as f64 / (node_count as f64 * (node_count - 1) as f64)
}
