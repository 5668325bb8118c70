//! Attribution ("why chain"): why is a node in the closure at all?
//!
//! [`paths`] finds the dependency chains that connect a target to the
//! top-level nodes and groups them by the node that links each chain to the
//! target. [`contribution`] answers the inverse question per top-level node:
//! how much of its closure nobody else pulls in.

pub mod contribution;
pub mod paths;

use drvgraph_core::model::NodeId;
use drvgraph_core::{AnalysisContext, Result};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::cache::{AnalysisCache, AnalysisKind};
use crate::graph::GraphSnapshot;

pub use contribution::{Contribution, compute_contributions, update_contributions};
pub use paths::{AttributionGroup, AttributionPath, PathSearch, aggregate_paths, find_paths_to_node};

/// What removing the target's dependents would mean for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalImpact {
    /// Reachable from at least one top-level node.
    Essential,
    /// No top-level node pulls it in.
    Orphan,
}

impl RemovalImpact {
    #[must_use]
    pub const fn from_paths(paths: &[AttributionPath]) -> Self {
        if paths.is_empty() { Self::Orphan } else { Self::Essential }
    }
}

/// Classify `target_id` with the context's attribution bounds.
pub fn classify_removal_impact(
    ctx: &AnalysisContext<'_>,
    snapshot: &GraphSnapshot,
    target_id: NodeId,
) -> Result<RemovalImpact> {
    let bounds = &ctx.config().attribution;
    let search = find_paths_to_node(snapshot, target_id, bounds.max_depth, bounds.max_paths)?;
    Ok(RemovalImpact::from_paths(&search.paths))
}

/// Everything the attribution view shows for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhyChain {
    pub target_id: NodeId,
    pub target_label: String,
    pub paths: Vec<AttributionPath>,
    pub groups: Vec<AttributionGroup>,
    pub impact: RemovalImpact,
    pub max_depth: usize,
    pub max_paths: usize,
    pub truncated: bool,
}

/// Build the why chain for `target_id`. A cached entry is served when it
/// matches both the snapshot hash and the current attribution bounds.
#[instrument(skip(ctx, snapshot), fields(import_id = snapshot.import_id))]
pub fn why_chain(
    ctx: &AnalysisContext<'_>,
    snapshot: &GraphSnapshot,
    target_id: NodeId,
) -> Result<WhyChain> {
    snapshot.require_node(target_id)?;
    let bounds = &ctx.config().attribution;
    let cache = AnalysisCache::new(ctx);
    let kind = AnalysisKind::WhyChain(target_id);

    if let Some(hit) =
        cache.get_fresh::<WhyChain>(snapshot.import_id, &kind, &snapshot.content_hash)?
    {
        if hit.payload.max_depth == bounds.max_depth && hit.payload.max_paths == bounds.max_paths {
            return Ok(hit.payload);
        }
    }

    let chain = build_why_chain(snapshot, target_id, bounds.max_depth, bounds.max_paths)?;
    cache.put(snapshot.import_id, &kind, &chain, &snapshot.content_hash)?;
    Ok(chain)
}

/// Uncached why chain.
pub fn build_why_chain(
    snapshot: &GraphSnapshot,
    target_id: NodeId,
    max_depth: usize,
    max_paths: usize,
) -> Result<WhyChain> {
    let target = snapshot.require_node(target_id)?;
    let search = find_paths_to_node(snapshot, target_id, max_depth, max_paths)?;
    Ok(WhyChain {
        target_id,
        target_label: snapshot.node(target).label.clone(),
        groups: aggregate_paths(snapshot, &search.paths),
        impact: RemovalImpact::from_paths(&search.paths),
        paths: search.paths,
        max_depth,
        max_paths,
        truncated: search.truncated,
    })
}
