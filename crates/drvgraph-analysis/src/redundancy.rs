//! Bounded transitive-reduction approximation.
//!
//! An edge `A → C` is redundant when some other path `A → B → … → C` exists,
//! so dropping the edge leaves reachability unchanged. Exact transitive
//! reduction is too expensive on 100k-node graphs; the search here only
//! looks `max_depth` hops deep. Anything it flags is truly redundant, but
//! longer bypasses are missed, so reports always carry `exact: false`.
//!
//! Per source `A` the check runs in two passes:
//!
//! 1. **Two-hop bypass.** Mark `A`'s children, then scan each child's
//!    children. Any marked hit `C` reached through `B ≠ C` is redundant.
//! 2. **Bounded BFS.** For children the first pass left unflagged, run one
//!    BFS seeded with every child of `A` at distance 1, each carrying its own
//!    origin label. A node keeps at most two distinct origins (the two
//!    nearest), which is enough to tell whether a child `C` is reached from
//!    an origin other than itself within `max_depth`. `A` itself is never
//!    expanded.
//!
//! Working arrays are sized once per run and reset through a touched list,
//! so the cost per source is proportional to what its BFS actually visits.

use std::collections::VecDeque;

use drvgraph_core::db::write;
use drvgraph_core::model::EdgeId;
use drvgraph_core::{AnalysisContext, Result};
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cache::{AnalysisCache, AnalysisKind};
use crate::graph::GraphSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedundancyReport {
    pub edges_examined: usize,
    pub edges_total: usize,
    /// Ascending.
    pub redundant_edge_ids: Vec<EdgeId>,
    pub max_depth: usize,
    pub edge_limit: usize,
    /// Always `false`: bypasses longer than `max_depth` are not searched.
    pub exact: bool,
    /// `true` when `edge_limit` stopped the run before every edge was examined.
    pub truncated: bool,
}

/// Outcome of [`mark_redundant_edges`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOutcome {
    /// Edges whose stored flag flipped.
    pub changed: usize,
    pub report: RedundancyReport,
}

/// Up to two distinct origins that reached a node, nearest first.
#[derive(Debug, Clone, Copy, Default)]
struct Labels {
    slots: [Option<(NodeIndex, usize)>; 2],
}

impl Labels {
    fn has(&self, origin: NodeIndex) -> bool {
        self.slots.iter().flatten().any(|&(o, _)| o == origin)
    }

    /// Record `origin` at `dist` if there is room; returns whether it was added.
    fn offer(&mut self, origin: NodeIndex, dist: usize) -> bool {
        if self.has(origin) {
            return false;
        }
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some((origin, dist));
                true
            }
            None => false,
        }
    }

    /// Distance from the nearest origin other than `except`.
    fn other_than(&self, except: NodeIndex) -> Option<usize> {
        self.slots
            .iter()
            .flatten()
            .filter(|&&(o, _)| o != except)
            .map(|&(_, d)| d)
            .min()
    }
}

/// Scratch state reused across sources.
struct Scratch {
    is_child: Vec<bool>,
    labels: Vec<Labels>,
    touched: Vec<usize>,
    queue: VecDeque<(NodeIndex, NodeIndex, usize)>,
}

impl Scratch {
    fn new(n: usize) -> Self {
        Self {
            is_child: vec![false; n],
            labels: vec![Labels::default(); n],
            touched: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    fn reset(&mut self) {
        for idx in self.touched.drain(..) {
            self.labels[idx] = Labels::default();
        }
        self.queue.clear();
    }
}

/// Find redundant edges of `snapshot`, examining at most `max_edges` edges
/// and bypasses of at most `max_depth` hops.
#[instrument(skip(snapshot), fields(import_id = snapshot.import_id))]
pub fn find_redundant_edges(
    snapshot: &GraphSnapshot,
    max_depth: usize,
    max_edges: usize,
) -> RedundancyReport {
    let graph = &snapshot.graph;
    let mut scratch = Scratch::new(snapshot.node_count());
    let mut redundant: Vec<EdgeId> = Vec::new();
    let mut examined = 0_usize;
    let mut truncated = false;

    for source in graph.node_indices() {
        let children: Vec<(NodeIndex, EdgeId)> = graph
            .edges(source)
            .map(|edge| (edge.target(), edge.weight().id))
            .collect();
        if children.is_empty() {
            continue;
        }
        if examined + children.len() > max_edges {
            truncated = true;
            break;
        }
        examined += children.len();

        // A single child has no sibling to bypass through.
        if children.len() < 2 || max_depth < 2 {
            continue;
        }

        let mut flagged = vec![false; children.len()];
        two_hop_pass(snapshot, &children, &mut flagged, &mut scratch);

        if max_depth > 2 && flagged.iter().any(|&f| !f) {
            bounded_pass(snapshot, source, &children, &mut flagged, max_depth, &mut scratch);
        }

        redundant.extend(
            children
                .iter()
                .zip(&flagged)
                .filter(|&(_, &f)| f)
                .map(|(&(_, edge_id), _)| edge_id),
        );
    }

    redundant.sort_unstable();
    if truncated {
        warn!(examined, total = snapshot.edge_count(), max_edges, "redundancy search truncated");
    }
    debug!(examined, redundant = redundant.len(), "redundancy search finished");

    RedundancyReport {
        edges_examined: examined,
        edges_total: snapshot.edge_count(),
        redundant_edge_ids: redundant,
        max_depth,
        edge_limit: max_edges,
        exact: false,
        truncated,
    }
}

fn two_hop_pass(
    snapshot: &GraphSnapshot,
    children: &[(NodeIndex, EdgeId)],
    flagged: &mut [bool],
    scratch: &mut Scratch,
) {
    for &(child, _) in children {
        scratch.is_child[child.index()] = true;
    }
    for &(via, _) in children {
        for grandchild in snapshot.graph.neighbors(via) {
            if scratch.is_child[grandchild.index()] {
                if let Some(pos) = children.iter().position(|&(c, _)| c == grandchild) {
                    flagged[pos] = true;
                }
            }
        }
    }
    for &(child, _) in children {
        scratch.is_child[child.index()] = false;
    }
}

fn bounded_pass(
    snapshot: &GraphSnapshot,
    source: NodeIndex,
    children: &[(NodeIndex, EdgeId)],
    flagged: &mut [bool],
    max_depth: usize,
    scratch: &mut Scratch,
) {
    for &(child, _) in children {
        scratch.labels[child.index()].offer(child, 1);
        scratch.touched.push(child.index());
        scratch.queue.push_back((child, child, 1));
    }

    while let Some((node, origin, dist)) = scratch.queue.pop_front() {
        if dist >= max_depth {
            continue;
        }
        for next in snapshot.graph.neighbors(node) {
            if next == source {
                continue;
            }
            let labels = &mut scratch.labels[next.index()];
            let fresh = labels.slots.iter().all(Option::is_none);
            if labels.offer(origin, dist + 1) {
                if fresh {
                    scratch.touched.push(next.index());
                }
                scratch.queue.push_back((next, origin, dist + 1));
            }
        }
    }

    for (pos, &(child, _)) in children.iter().enumerate() {
        if !flagged[pos]
            && scratch.labels[child.index()]
                .other_than(child)
                .is_some_and(|d| d <= max_depth)
        {
            flagged[pos] = true;
        }
    }

    scratch.reset();
}

/// Recompute redundancy for the snapshot with the context's bounds, rewrite
/// the stored flags and cache the report.
#[instrument(skip_all, fields(import_id = snapshot.import_id))]
pub fn mark_redundant_edges(
    ctx: &AnalysisContext<'_>,
    snapshot: &GraphSnapshot,
) -> Result<MarkOutcome> {
    let bounds = &ctx.config().redundancy;
    let report = find_redundant_edges(snapshot, bounds.max_depth, bounds.max_edges);

    let changed =
        write::mark_redundant_edges(ctx.conn(), snapshot.import_id, &report.redundant_edge_ids)?;
    AnalysisCache::new(ctx).put(
        snapshot.import_id,
        &AnalysisKind::Redundancy,
        &report,
        &snapshot.content_hash,
    )?;

    info!(
        changed,
        redundant = report.redundant_edge_ids.len(),
        truncated = report.truncated,
        "redundant edge flags updated"
    );
    Ok(MarkOutcome { changed, report })
}
