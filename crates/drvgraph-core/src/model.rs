//! Graph store entities.
//!
//! Structural fields are strongly typed. Per-node metadata is an opaque JSON
//! object owned by external collaborators; nothing in the engine reads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub type ImportId = i64;
pub type NodeId = i64;
pub type EdgeId = i64;

/// Schema-less per-node payload.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Externally supplied classification of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    Build,
    Runtime,
    #[default]
    Unknown,
}

impl DependencyType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Runtime => "runtime",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for DependencyType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "build" => Ok(Self::Build),
            "runtime" => Ok(Self::Runtime),
            "unknown" => Ok(Self::Unknown),
            _ => Err(ParseEnumError {
                expected: "dependency type",
                got: s.to_string(),
            }),
        }
    }
}

/// A graph snapshot boundary. Every node and edge belongs to exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub id: ImportId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A derivation as stored, including the fields the engine derives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub import_id: ImportId,
    pub drv_hash: String,
    pub label: String,
    pub package_type: Option<String>,
    pub is_top_level: bool,
    /// Shortest hop count from a root; `None` when unreachable or not yet computed.
    pub depth: Option<u32>,
    pub closure_size: Option<u64>,
    pub unique_contribution: Option<u64>,
    pub shared_contribution: Option<u64>,
    pub metadata: Metadata,
}

/// The structural subset of a node that graph loading needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub drv_hash: String,
    pub label: String,
    pub package_type: Option<String>,
    pub is_top_level: bool,
}

/// A directed dependency: `source_id` depends on `target_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub import_id: ImportId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub dependency_type: DependencyType,
    pub is_redundant: bool,
}

/// Node payload handed to the store by an importer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewNode {
    pub drv_hash: String,
    pub label: String,
    pub package_type: Option<String>,
    pub is_top_level: bool,
    pub metadata: Metadata,
}

impl NewNode {
    #[must_use]
    pub fn new(drv_hash: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            drv_hash: drv_hash.into(),
            label: label.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn top_level(mut self) -> Self {
        self.is_top_level = true;
        self
    }

    #[must_use]
    pub fn with_package_type(mut self, package_type: impl Into<String>) -> Self {
        self.package_type = Some(package_type.into());
        self
    }
}

/// Edge payload handed to the store by an importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewEdge {
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub dependency_type: DependencyType,
}

impl NewEdge {
    #[must_use]
    pub const fn new(source_id: NodeId, target_id: NodeId) -> Self {
        Self {
            source_id,
            target_id,
            dependency_type: DependencyType::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_type_round_trips_through_text() {
        for ty in [
            DependencyType::Build,
            DependencyType::Runtime,
            DependencyType::Unknown,
        ] {
            assert_eq!(ty.to_string().parse::<DependencyType>(), Ok(ty));
        }
        assert_eq!(" Runtime ".parse::<DependencyType>(), Ok(DependencyType::Runtime));
    }

    #[test]
    fn dependency_type_rejects_garbage() {
        let err = "weak".parse::<DependencyType>().expect_err("should fail");
        assert_eq!(err.to_string(), "invalid dependency type: 'weak'");
    }

    #[test]
    fn dependency_type_serializes_lowercase() {
        let json = serde_json::to_string(&DependencyType::Build).expect("serialize");
        assert_eq!(json, "\"build\"");
    }

    #[test]
    fn new_node_builder_sets_flags() {
        let node = NewNode::new("abc123", "hello-2.12")
            .top_level()
            .with_package_type("application");
        assert!(node.is_top_level);
        assert_eq!(node.package_type.as_deref(), Some("application"));
        assert!(node.metadata.is_empty());
    }
}
