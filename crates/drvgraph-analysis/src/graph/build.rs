//! Graph construction from the SQLite graph store.
//!
//! # Overview
//!
//! [`GraphSnapshot::load`] reads one import's `nodes` and `edges` rows and
//! builds a [`petgraph`] directed graph that every analysis shares.
//!
//! Nodes are inserted in ascending id order, so `NodeIndex` order and node
//! id order agree. Analyses that promise "ascending id" determinism rely on
//! this.
//!
//! ## Integrity
//!
//! The store does not stop an edge from pointing at a node of another import.
//! The loader does: such an edge fails the load with
//! [`Error::InvalidGraph`]. Self-loops are rejected the same way. Duplicate
//! `(source, target)` pairs are collapsed to the lowest edge id.

use std::collections::{HashMap, HashSet};

use drvgraph_core::db::query;
use drvgraph_core::model::{DependencyType, Edge, EdgeId, ImportId, NodeId, NodeRecord};
use drvgraph_core::{AnalysisContext, Error, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

// ---------------------------------------------------------------------------
// GraphSnapshot
// ---------------------------------------------------------------------------

/// Edge weight: the stored edge this graph edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeAttrs {
    pub id: EdgeId,
    pub dependency_type: DependencyType,
}

/// An immutable, read-only view of one import.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub import_id: ImportId,
    /// Directed graph: nodes = derivations, edges = "depends on".
    pub graph: DiGraph<NodeRecord, EdgeAttrs>,
    /// Mapping from node id to petgraph `NodeIndex`.
    pub node_map: HashMap<NodeId, NodeIndex>,
    /// BLAKE3 content hash of the node keys and edge set.
    pub content_hash: String,
}

impl GraphSnapshot {
    /// Load the snapshot of `import_id` from the store.
    ///
    /// # Errors
    ///
    /// [`Error::ImportNotFound`] if the import does not exist,
    /// [`Error::InvalidGraph`] if an edge leaves the import, or a database
    /// error.
    #[instrument(skip(ctx))]
    pub fn load(ctx: &AnalysisContext<'_>, import_id: ImportId) -> Result<Self> {
        let conn = ctx.conn();
        query::require_import(conn, import_id)?;
        let nodes = query::load_node_records(conn, import_id)?;
        let edges = query::list_edges(conn, import_id)?;
        let snapshot = Self::from_records(import_id, nodes, &edges)?;
        debug!(
            import_id,
            nodes = snapshot.node_count(),
            edges = snapshot.edge_count(),
            hash = %snapshot.content_hash,
            "loaded graph snapshot"
        );
        Ok(snapshot)
    }

    /// Build a snapshot from already-fetched rows.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidGraph`] when an edge belongs to another import,
    /// references a node that is not part of `nodes`, or is a self-loop.
    pub fn from_records(
        import_id: ImportId,
        mut nodes: Vec<NodeRecord>,
        edges: &[Edge],
    ) -> Result<Self> {
        nodes.sort_unstable_by_key(|node| node.id);
        nodes.dedup_by_key(|node| node.id);

        let mut graph = DiGraph::<NodeRecord, EdgeAttrs>::with_capacity(nodes.len(), edges.len());
        let mut node_map: HashMap<NodeId, NodeIndex> = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let id = node.id;
            let idx = graph.add_node(node);
            node_map.insert(id, idx);
        }

        let mut ordered: Vec<&Edge> = edges.iter().collect();
        ordered.sort_unstable_by_key(|edge| edge.id);

        let mut seen: HashSet<(NodeIndex, NodeIndex)> = HashSet::with_capacity(ordered.len());
        for edge in ordered {
            if edge.import_id != import_id {
                return Err(Error::InvalidGraph(format!(
                    "edge {} belongs to import {}, not {import_id}",
                    edge.id, edge.import_id
                )));
            }
            if edge.source_id == edge.target_id {
                return Err(Error::InvalidGraph(format!(
                    "edge {} is a self-loop on node {}",
                    edge.id, edge.source_id
                )));
            }
            let endpoint = |node_id: NodeId| {
                node_map.get(&node_id).copied().ok_or_else(|| {
                    Error::InvalidGraph(format!(
                        "edge {} references node {node_id} outside import {import_id}",
                        edge.id
                    ))
                })
            };
            let source = endpoint(edge.source_id)?;
            let target = endpoint(edge.target_id)?;

            // Avoid duplicate edges (petgraph allows them by default).
            if seen.insert((source, target)) {
                graph.add_edge(
                    source,
                    target,
                    EdgeAttrs {
                        id: edge.id,
                        dependency_type: edge.dependency_type,
                    },
                );
            }
        }

        let content_hash = compute_content_hash(&graph);

        Ok(Self {
            import_id,
            graph,
            node_map,
            content_hash,
        })
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Look up the `NodeIndex` for a node id.
    #[must_use]
    pub fn node_index(&self, node_id: NodeId) -> Option<NodeIndex> {
        self.node_map.get(&node_id).copied()
    }

    /// Look up the `NodeIndex` for a node id, failing with
    /// [`Error::NodeNotFound`].
    pub fn require_node(&self, node_id: NodeId) -> Result<NodeIndex> {
        self.node_index(node_id).ok_or(Error::NodeNotFound {
            import_id: self.import_id,
            node_id,
        })
    }

    /// The stored record behind an index.
    ///
    /// # Panics
    ///
    /// Panics if `idx` does not belong to this snapshot.
    #[must_use]
    pub fn node(&self, idx: NodeIndex) -> &NodeRecord {
        &self.graph[idx]
    }

    #[must_use]
    pub fn node_id(&self, idx: NodeIndex) -> NodeId {
        self.graph[idx].id
    }

    #[must_use]
    pub fn is_top_level(&self, idx: NodeIndex) -> bool {
        self.graph[idx].is_top_level
    }

    /// Direct dependencies of `idx`, ascending.
    #[must_use]
    pub fn successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.sorted_neighbors(idx, Direction::Outgoing)
    }

    /// Direct dependents of `idx`, ascending.
    #[must_use]
    pub fn predecessors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.sorted_neighbors(idx, Direction::Incoming)
    }

    #[must_use]
    pub fn in_degree(&self, idx: NodeIndex) -> usize {
        self.graph.neighbors_directed(idx, Direction::Incoming).count()
    }

    #[must_use]
    pub fn out_degree(&self, idx: NodeIndex) -> usize {
        self.graph.neighbors_directed(idx, Direction::Outgoing).count()
    }

    /// Depth roots: nodes without dependents plus every top-level node,
    /// ascending.
    #[must_use]
    pub fn roots(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&idx| self.is_top_level(idx) || self.in_degree(idx) == 0)
            .collect()
    }

    /// Nodes flagged top-level, ascending.
    #[must_use]
    pub fn top_level_nodes(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&idx| self.is_top_level(idx))
            .collect()
    }

    fn sorted_neighbors(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        neighbors.sort_unstable();
        neighbors
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// BLAKE3 over node keys (id order) followed by the sorted edge list.
fn compute_content_hash(graph: &DiGraph<NodeRecord, EdgeAttrs>) -> String {
    let mut hasher = blake3::Hasher::new();
    for node in graph.node_weights() {
        hasher.update(&node.id.to_le_bytes());
        hasher.update(node.drv_hash.as_bytes());
        hasher.update(if node.is_top_level { b"\x01" } else { b"\x00" });
    }
    hasher.update(b"\xff");

    let mut pairs: Vec<(NodeId, NodeId)> = graph
        .raw_edges()
        .iter()
        .map(|edge| (graph[edge.source()].id, graph[edge.target()].id))
        .collect();
    pairs.sort_unstable();
    for (source, target) in pairs {
        hasher.update(&source.to_le_bytes());
        hasher.update(&target.to_le_bytes());
    }
    format!("blake3:{}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
