#![forbid(unsafe_code)]
//! drvgraph-core library.
//!
//! Holds everything the analysis engine shares with the graph store: the
//! node/edge/import model, the reference SQLite schema and its queries, the
//! analysis configuration, and the request-scoped [`AnalysisContext`].
//!
//! # Conventions
//!
//! - **Errors**: store and engine operations return [`error::Result`];
//!   configuration loading uses `anyhow::Result` with context.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod model;

pub use config::AnalysisConfig;
pub use context::AnalysisContext;
pub use error::{Error, ErrorCode, Result};
