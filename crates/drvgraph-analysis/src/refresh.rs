//! Full refresh of an import's derived fields and cached analyses.
//!
//! One pass over a single snapshot recomputes everything the store keeps
//! per import: node depth and closure size, redundant-edge flags, top-level
//! contributions, and the loop and summary reports. Every cached entry is
//! stamped with the snapshot's content hash, so a refresh leaves the cache
//! fresh for that graph.

use std::time::{Duration, Instant};

use drvgraph_core::model::ImportId;
use drvgraph_core::{AnalysisContext, Result};
use tracing::{debug, info, instrument, warn};

use crate::attribution;
use crate::cache::{AnalysisCache, AnalysisKind};
use crate::depth::{self, compute_closure_sizes_with, compute_depths};
use crate::graph::{GraphSnapshot, GraphSummary, SccPartition, find_loops_with};
use crate::redundancy;

// ---------------------------------------------------------------------------
// RefreshReport
// ---------------------------------------------------------------------------

/// Report returned after [`refresh_import`].
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    pub import_id: ImportId,
    /// Content hash every refreshed cache entry was stamped with.
    pub graph_hash: String,
    pub node_count: usize,
    pub edge_count: usize,
    /// Rows that received depth and closure size.
    pub depths_written: usize,
    /// Edges whose redundant flag flipped.
    pub redundant_changed: usize,
    pub redundancy_truncated: bool,
    /// Top-level rows that received contribution counts.
    pub contributions_written: usize,
    pub cycle_count: usize,
    pub summary: GraphSummary,
    /// Wall-clock elapsed time for the whole pass.
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// refresh_import
// ---------------------------------------------------------------------------

/// Recompute and persist every derived fact for `import_id`.
///
/// 1. Loads the snapshot and its SCC partition once
/// 2. Writes depth and closure size per node
/// 3. Rewrites the redundant-edge flags
/// 4. Writes unique/shared contributions for top-level nodes
/// 5. Caches the loop report and the graph summary
///
/// Each bulk write runs in its own transaction; a failure part way leaves
/// earlier steps committed and later ones untouched.
#[instrument(skip(ctx))]
pub fn refresh_import(ctx: &AnalysisContext<'_>, import_id: ImportId) -> Result<RefreshReport> {
    let start = Instant::now();

    let snapshot = GraphSnapshot::load(ctx, import_id)?;
    let partition = SccPartition::compute(&snapshot.graph);
    debug!(
        components = partition.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "snapshot partitioned"
    );

    let step = Instant::now();
    let depths = compute_depths(&snapshot);
    let closures = compute_closure_sizes_with(&snapshot, &partition);
    let depths_written = depth::write_depths_and_closures(ctx, &snapshot, &depths, &closures)?;
    debug!(elapsed_ms = step.elapsed().as_millis(), "depth pass done");

    let step = Instant::now();
    let marked = redundancy::mark_redundant_edges(ctx, &snapshot)?;
    if marked.report.truncated {
        warn!(
            examined = marked.report.edges_examined,
            total = marked.report.edges_total,
            "redundancy pass hit its edge limit"
        );
    }
    debug!(elapsed_ms = step.elapsed().as_millis(), "redundancy pass done");

    let step = Instant::now();
    let contributions = attribution::update_contributions(ctx, &snapshot, &closures)?;
    debug!(elapsed_ms = step.elapsed().as_millis(), "contribution pass done");

    let cache = AnalysisCache::new(ctx);
    let loops = find_loops_with(&snapshot, &partition);
    cache.put(import_id, &AnalysisKind::Loops, &loops, &snapshot.content_hash)?;
    let summary = GraphSummary::compute(&snapshot, &partition, &depths);
    cache.put(import_id, &AnalysisKind::Summary, &summary, &snapshot.content_hash)?;

    let elapsed = start.elapsed();
    info!(
        nodes = snapshot.node_count(),
        edges = snapshot.edge_count(),
        cycles = loops.cycle_count,
        redundant = marked.report.redundant_edge_ids.len(),
        elapsed_ms = elapsed.as_millis(),
        "import refreshed"
    );

    Ok(RefreshReport {
        import_id,
        node_count: snapshot.node_count(),
        edge_count: snapshot.edge_count(),
        depths_written,
        redundant_changed: marked.changed,
        redundancy_truncated: marked.report.truncated,
        contributions_written: contributions.len(),
        cycle_count: loops.cycle_count,
        summary,
        elapsed,
        graph_hash: snapshot.content_hash,
    })
}
