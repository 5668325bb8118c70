//! Request-scoped analysis context.
//!
//! Every engine entry point takes an [`AnalysisContext`] instead of reaching
//! for a shared connection or cache. Independent analyses that run on
//! separate threads each build their own context around their own
//! [`Connection`].

use rusqlite::Connection;

use crate::config::AnalysisConfig;

#[derive(Debug)]
pub struct AnalysisContext<'conn> {
    conn: &'conn Connection,
    config: AnalysisConfig,
}

impl<'conn> AnalysisContext<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection, config: AnalysisConfig) -> Self {
        Self { conn, config }
    }

    /// Context with the default search bounds.
    #[must_use]
    pub fn with_defaults(conn: &'conn Connection) -> Self {
        Self::new(conn, AnalysisConfig::default())
    }

    #[must_use]
    pub const fn conn(&self) -> &'conn Connection {
        self.conn
    }

    #[must_use]
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }
}
