//! Snapshot builders shared by unit tests.

use drvgraph_core::model::{DependencyType, Edge, EdgeId, ImportId, NodeId, NodeRecord};

use crate::graph::GraphSnapshot;

pub fn record(id: NodeId, label: &str, is_top_level: bool) -> NodeRecord {
    NodeRecord {
        id,
        drv_hash: format!("h-{label}"),
        label: label.to_string(),
        package_type: None,
        is_top_level,
    }
}

pub const fn edge(id: EdgeId, import_id: ImportId, source_id: NodeId, target_id: NodeId) -> Edge {
    Edge {
        id,
        import_id,
        source_id,
        target_id,
        dependency_type: DependencyType::Unknown,
        is_redundant: false,
    }
}

/// Build a snapshot of import 1. Node `i` of `nodes` gets id `i + 1`;
/// `edges` are pairs of positions into `nodes` and get ids `1..`.
pub fn snapshot(nodes: &[(&str, bool)], edges: &[(usize, usize)]) -> GraphSnapshot {
    let records = nodes
        .iter()
        .zip(1..)
        .map(|(&(label, top), id)| record(id, label, top))
        .collect();
    let edges: Vec<Edge> = edges
        .iter()
        .zip(1..)
        .map(|(&(source, target), id)| edge(id, 1, position_id(source), position_id(target)))
        .collect();
    GraphSnapshot::from_records(1, records, &edges).expect("build test snapshot")
}

/// Node id assigned to position `pos` by [`snapshot`].
pub fn position_id(pos: usize) -> NodeId {
    NodeId::try_from(pos).expect("small position") + 1
}

/// Node ids for a list of labels, resolved against the snapshot.
pub fn ids(graph: &GraphSnapshot, labels: &[&str]) -> Vec<NodeId> {
    labels
        .iter()
        .map(|label| {
            graph
                .graph
                .node_weights()
                .find(|node| node.label == *label)
                .map(|node| node.id)
                .expect("label present")
        })
        .collect()
}
