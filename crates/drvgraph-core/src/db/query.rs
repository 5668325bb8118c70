//! Read queries against the graph store.
//!
//! All functions take a shared `&Connection` and return typed model structs.
//! Node and edge listings are ordered by id so every consumer sees the graph
//! in the same canonical order.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};

use crate::error::{Error, Result};
use crate::model::{DependencyType, Edge, EdgeId, Import, ImportId, Metadata, Node, NodeId, NodeRecord};

const NODE_COLUMNS: &str = "id, import_id, drv_hash, label, package_type, is_top_level,
     depth, closure_size, unique_contribution, shared_contribution, metadata_json";

const EDGE_COLUMNS: &str = "id, import_id, source_id, target_id, dependency_type, is_redundant";

/// Fetch one import, failing with [`Error::ImportNotFound`] if absent.
pub fn get_import(conn: &Connection, import_id: ImportId) -> Result<Import> {
    conn.query_row(
        "SELECT id, name, created_at_us FROM imports WHERE id = ?1",
        params![import_id],
        row_to_import,
    )
    .optional()?
    .ok_or(Error::ImportNotFound(import_id))
}

/// Fail with [`Error::ImportNotFound`] unless the import exists.
pub fn require_import(conn: &Connection, import_id: ImportId) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM imports WHERE id = ?1)",
        params![import_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(Error::ImportNotFound(import_id))
    }
}

/// All imports, oldest first.
pub fn list_imports(conn: &Connection) -> Result<Vec<Import>> {
    let mut stmt = conn.prepare("SELECT id, name, created_at_us FROM imports ORDER BY id")?;
    let imports = stmt
        .query_map([], row_to_import)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(imports)
}

/// Fetch one node of an import, failing with [`Error::NodeNotFound`].
pub fn get_node(conn: &Connection, import_id: ImportId, node_id: NodeId) -> Result<Node> {
    let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE import_id = ?1 AND id = ?2");
    conn.query_row(&sql, params![import_id, node_id], row_to_node)
        .optional()?
        .ok_or(Error::NodeNotFound { import_id, node_id })
}

/// Look a node up by its content key.
pub fn find_node_by_hash(
    conn: &Connection,
    import_id: ImportId,
    drv_hash: &str,
) -> Result<Option<Node>> {
    let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE import_id = ?1 AND drv_hash = ?2");
    Ok(conn
        .query_row(&sql, params![import_id, drv_hash], row_to_node)
        .optional()?)
}

/// Every node of an import, including metadata and derived fields.
pub fn list_nodes(conn: &Connection, import_id: ImportId) -> Result<Vec<Node>> {
    let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE import_id = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let nodes = stmt
        .query_map(params![import_id], row_to_node)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(nodes)
}

/// The structural columns of every node of an import, ordered by id.
pub fn load_node_records(conn: &Connection, import_id: ImportId) -> Result<Vec<NodeRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, drv_hash, label, package_type, is_top_level
         FROM nodes
         WHERE import_id = ?1
         ORDER BY id",
    )?;
    let records = stmt
        .query_map(params![import_id], |row| {
            Ok(NodeRecord {
                id: row.get(0)?,
                drv_hash: row.get(1)?,
                label: row.get(2)?,
                package_type: row.get(3)?,
                is_top_level: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Every edge of an import, ordered by id.
pub fn list_edges(conn: &Connection, import_id: ImportId) -> Result<Vec<Edge>> {
    let sql = format!("SELECT {EDGE_COLUMNS} FROM edges WHERE import_id = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let edges = stmt
        .query_map(params![import_id], row_to_edge)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(edges)
}

/// Ids of the edges currently flagged redundant, ascending.
pub fn redundant_edge_ids(conn: &Connection, import_id: ImportId) -> Result<Vec<EdgeId>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM edges WHERE import_id = ?1 AND is_redundant = 1 ORDER BY id",
    )?;
    let ids = stmt
        .query_map(params![import_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<EdgeId>, _>>()?;
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_import(row: &Row<'_>) -> rusqlite::Result<Import> {
    Ok(Import {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: micros_to_datetime(row.get(2)?),
    })
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<Node> {
    let metadata_json: String = row.get(10)?;
    let metadata: Metadata = serde_json::from_str(&metadata_json)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(error)))?;

    Ok(Node {
        id: row.get(0)?,
        import_id: row.get(1)?,
        drv_hash: row.get(2)?,
        label: row.get(3)?,
        package_type: row.get(4)?,
        is_top_level: row.get(5)?,
        depth: row.get(6)?,
        closure_size: non_negative(row.get(7)?),
        unique_contribution: non_negative(row.get(8)?),
        shared_contribution: non_negative(row.get(9)?),
        metadata,
    })
}

fn row_to_edge(row: &Row<'_>) -> rusqlite::Result<Edge> {
    let raw_type: String = row.get(4)?;
    let dependency_type = raw_type
        .parse::<DependencyType>()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(error)))?;

    Ok(Edge {
        id: row.get(0)?,
        import_id: row.get(1)?,
        source_id: row.get(2)?,
        target_id: row.get(3)?,
        dependency_type,
        is_redundant: row.get(5)?,
    })
}

fn non_negative(value: Option<i64>) -> Option<u64> {
    value.and_then(|v| u64::try_from(v).ok())
}

pub(crate) fn micros_to_datetime(us: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(us).unwrap_or_default()
}
