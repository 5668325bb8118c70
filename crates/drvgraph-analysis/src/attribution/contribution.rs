//! Unique vs shared closure contribution per top-level node.
//!
//! A node in the closure of top-level `T` is *unique* to `T` when no other
//! top-level node reaches it, and *shared* otherwise. A top-level node counts
//! as reaching itself, so another top-level inside `T`'s closure is shared.
//!
//! One propagation pass answers this for every `T` at once: each top-level
//! node seeds its own origin label, and a node keeps at most two distinct
//! origins. A node with exactly one origin is unique to it; every other
//! closure member is shared.

use std::collections::VecDeque;

use drvgraph_core::db::write::{self, ContributionFields};
use drvgraph_core::model::NodeId;
use drvgraph_core::{AnalysisContext, Result};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::cache::{AnalysisCache, AnalysisKind};
use crate::depth::ClosureSizes;
use crate::graph::GraphSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub node_id: NodeId,
    pub label: String,
    pub closure_size: u64,
    pub unique_contribution: u64,
    pub shared_contribution: u64,
}

/// Contribution counts for every top-level node, ascending by id.
#[must_use]
#[instrument(skip_all, fields(import_id = snapshot.import_id))]
pub fn compute_contributions(snapshot: &GraphSnapshot, closures: &ClosureSizes) -> Vec<Contribution> {
    let tops = snapshot.top_level_nodes();
    let origins = reaching_origins(snapshot, &tops);

    let mut unique = vec![0_u64; snapshot.node_count()];
    for (idx, labels) in origins.iter().enumerate() {
        if let [Some(only), None] = labels {
            if only.index() != idx {
                unique[only.index()] += 1;
            }
        }
    }

    tops.into_iter()
        .map(|top| {
            let node = snapshot.node(top);
            let closure_size = closures.get(node.id).unwrap_or(0);
            let unique_contribution = unique[top.index()].min(closure_size);
            Contribution {
                node_id: node.id,
                label: node.label.clone(),
                closure_size,
                unique_contribution,
                shared_contribution: closure_size - unique_contribution,
            }
        })
        .collect()
}

/// Up to two distinct top-level origins reaching each node.
fn reaching_origins(snapshot: &GraphSnapshot, tops: &[NodeIndex]) -> Vec<[Option<NodeIndex>; 2]> {
    let mut origins: Vec<[Option<NodeIndex>; 2]> = vec![[None, None]; snapshot.node_count()];
    let mut queue: VecDeque<(NodeIndex, NodeIndex)> = VecDeque::new();

    for &top in tops {
        origins[top.index()][0] = Some(top);
        queue.push_back((top, top));
    }

    while let Some((node, origin)) = queue.pop_front() {
        for next in snapshot.graph.neighbors(node) {
            let slots = &mut origins[next.index()];
            if slots.contains(&Some(origin)) {
                continue;
            }
            if let Some(free) = slots.iter_mut().find(|slot| slot.is_none()) {
                *free = Some(origin);
                queue.push_back((next, origin));
            }
        }
    }

    origins
}

/// Compute contributions and write them back in one transaction; nodes that
/// are not top-level get `NULL`. The result is cached.
#[instrument(skip_all, fields(import_id = snapshot.import_id))]
pub fn update_contributions(
    ctx: &AnalysisContext<'_>,
    snapshot: &GraphSnapshot,
    closures: &ClosureSizes,
) -> Result<Vec<Contribution>> {
    let contributions = compute_contributions(snapshot, closures);
    let rows: Vec<ContributionFields> = contributions
        .iter()
        .map(|c| ContributionFields {
            node_id: c.node_id,
            unique_contribution: c.unique_contribution,
            shared_contribution: c.shared_contribution,
        })
        .collect();

    let updated = write::write_contributions(ctx.conn(), snapshot.import_id, &rows)?;
    AnalysisCache::new(ctx).put(
        snapshot.import_id,
        &AnalysisKind::Contributions,
        &contributions,
        &snapshot.content_hash,
    )?;
    info!(updated, "contribution counts written");
    Ok(contributions)
}
