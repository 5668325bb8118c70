#![forbid(unsafe_code)]
//! drvgraph-analysis library.
//!
//! Structural analyses over one import of the graph store. Every analysis
//! reads an immutable [`graph::GraphSnapshot`] and computes functionally;
//! persisting derived fields and cache entries happens in terminal bulk
//! writes.
//!
//! ```rust,ignore
//! use drvgraph_analysis::{graph::GraphSnapshot, refresh::refresh_import};
//! use drvgraph_core::AnalysisContext;
//!
//! let ctx = AnalysisContext::with_defaults(&conn);
//! let report = refresh_import(&ctx, import_id)?;
//! let snapshot = GraphSnapshot::load(&ctx, import_id)?;
//! let chain = drvgraph_analysis::attribution::why_chain(&ctx, &snapshot, node_id)?;
//! ```
//!
//! # Conventions
//!
//! - **Errors**: Use [`drvgraph_core::Result`] for return types. Bounded
//!   searches never fail on their bounds; they report `truncated` instead.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod attribution;
pub mod cache;
pub mod compare;
pub mod depth;
pub mod graph;
pub mod redundancy;
pub mod refresh;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{AnalysisCache, AnalysisKind, CachedAnalysis};
pub use graph::{GraphSnapshot, SccPartition};
