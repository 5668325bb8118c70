//! In-memory graph snapshot and structural primitives.
//!
//! ## Pipeline
//!
//! ```text
//! SQLite nodes / edges (one import)
//!        ↓  build::GraphSnapshot::load()
//! GraphSnapshot (DiGraph, may contain cycles)
//!        ↓  scc::SccPartition::compute()
//! SccPartition (components in reverse topological order)
//!   ├─ cycles::find_loops_with()   → LoopReport
//!   ├─ depth::compute_closure_sizes_with() → ClosureSizes
//!   └─ stats::GraphSummary::compute() → GraphSummary
//! ```
//!
//! ## Edge Direction
//!
//! An edge `A → B` means "A depends on B". Outgoing neighbors are a node's
//! direct dependencies; incoming neighbors are its direct dependents.
//!
//! ## Cache Invalidation
//!
//! [`GraphSnapshot::content_hash`] is a BLAKE3 hash of the node keys and the
//! edge set. Cached analyses carry the hash they were computed from, and a
//! mismatch means the entry is stale.

pub mod build;
pub mod cycles;
pub mod scc;
pub mod stats;

pub use build::{EdgeAttrs, GraphSnapshot};
pub use cycles::{CycleInfo, LoopReport, find_loops, find_loops_with, loops_for_import};
pub use scc::SccPartition;
pub use stats::{GraphSummary, summary_for_import};
