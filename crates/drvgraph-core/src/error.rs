use std::fmt;

use crate::model::{ImportId, NodeId};

/// Result type for store and engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that halt an analysis.
///
/// Bounded searches that hit their depth or count caps do not error; they
/// return a result annotated as truncated instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested import does not exist in the store.
    #[error("import {0} not found")]
    ImportNotFound(ImportId),

    /// The requested node does not exist within the import.
    #[error("node {node_id} not found in import {import_id}")]
    NodeNotFound { import_id: ImportId, node_id: NodeId },

    /// The stored graph violates an integrity rule (e.g. an edge pointing
    /// at a node of another import).
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A cached payload or metadata blob could not be encoded or decoded.
    #[error("payload encoding error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl Error {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ImportNotFound(_) => ErrorCode::ImportNotFound,
            Self::NodeNotFound { .. } => ErrorCode::NodeNotFound,
            Self::InvalidGraph(_) => ErrorCode::InvalidGraph,
            Self::Database(_) => ErrorCode::StoreFailure,
            Self::Payload(_) => ErrorCode::CorruptPayload,
        }
    }

    /// Returns `true` for the `NotFound` family of errors.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ImportNotFound(_) | Self::NodeNotFound { .. })
    }
}

/// Machine-readable error codes for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ImportNotFound,
    NodeNotFound,
    InvalidGraph,
    CorruptPayload,
    StoreFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ImportNotFound => "E2001",
            Self::NodeNotFound => "E2002",
            Self::InvalidGraph => "E3001",
            Self::CorruptPayload => "E3002",
            Self::StoreFailure => "E5001",
        }
    }

    /// Short human-facing summary for logs.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ImportNotFound => "Import not found",
            Self::NodeNotFound => "Node not found",
            Self::InvalidGraph => "Graph integrity violation",
            Self::CorruptPayload => "Corrupt analysis payload",
            Self::StoreFailure => "Graph store failure",
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ImportNotFound | Self::NodeNotFound => None,
            Self::InvalidGraph => {
                Some("Re-import the graph; edges must reference nodes of the same import.")
            }
            Self::CorruptPayload => Some("Invalidate the cached analyses for this import and retry."),
            Self::StoreFailure => Some("Check that the store is reachable and not locked, then retry."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
