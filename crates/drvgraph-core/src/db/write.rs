//! Bulk writes against the graph store.
//!
//! Two kinds of writer live here:
//! - the importer API (`create_import`, `insert_nodes`, `insert_edges`,
//!   `delete_import`) that external loaders use to materialize a snapshot
//! - the derived-field passes the engine runs after an analysis, each a single
//!   transaction so readers never observe a half-written pass
//!
//! The engine never adds or removes nodes and edges; it only rewrites the
//! derived columns.

use std::collections::HashSet;

use rusqlite::{Connection, params};
use tracing::{debug, instrument};

use super::now_us;
use crate::error::Result;
use crate::model::{EdgeId, ImportId, NewEdge, NewNode, NodeId};

/// Derived structural fields for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedFields {
    pub node_id: NodeId,
    pub depth: Option<u32>,
    pub closure_size: u64,
}

/// Attribution-derived counts for one top-level node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContributionFields {
    pub node_id: NodeId,
    pub unique_contribution: u64,
    pub shared_contribution: u64,
}

/// Register a new import and return its id.
pub fn create_import(conn: &Connection, name: &str) -> Result<ImportId> {
    conn.execute(
        "INSERT INTO imports (name, created_at_us) VALUES (?1, ?2)",
        params![name, now_us()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert nodes for an import, returning their ids in input order.
#[instrument(skip(conn, nodes), fields(count = nodes.len()))]
pub fn insert_nodes(conn: &Connection, import_id: ImportId, nodes: &[NewNode]) -> Result<Vec<NodeId>> {
    let tx = conn.unchecked_transaction()?;
    let mut ids = Vec::with_capacity(nodes.len());
    {
        let mut stmt = tx.prepare(
            "INSERT INTO nodes (import_id, drv_hash, label, package_type, is_top_level, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for node in nodes {
            let metadata_json = serde_json::to_string(&node.metadata)?;
            stmt.execute(params![
                import_id,
                node.drv_hash,
                node.label,
                node.package_type,
                node.is_top_level,
                metadata_json
            ])?;
            ids.push(tx.last_insert_rowid());
        }
    }
    tx.commit()?;
    Ok(ids)
}

/// Insert edges for an import, returning their ids in input order.
///
/// Endpoints are not checked against the import here; the graph loader
/// rejects cross-import edges when it materializes the snapshot.
#[instrument(skip(conn, edges), fields(count = edges.len()))]
pub fn insert_edges(conn: &Connection, import_id: ImportId, edges: &[NewEdge]) -> Result<Vec<EdgeId>> {
    let tx = conn.unchecked_transaction()?;
    let mut ids = Vec::with_capacity(edges.len());
    {
        let mut stmt = tx.prepare(
            "INSERT INTO edges (import_id, source_id, target_id, dependency_type)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for edge in edges {
            stmt.execute(params![
                import_id,
                edge.source_id,
                edge.target_id,
                edge.dependency_type.as_str()
            ])?;
            ids.push(tx.last_insert_rowid());
        }
    }
    tx.commit()?;
    Ok(ids)
}

/// Delete an import and, through cascades, its nodes, edges and cached
/// results. Comparison entries owned by other imports that reference this
/// one are removed as well.
///
/// Returns `false` if the import did not exist.
pub fn delete_import(conn: &Connection, import_id: ImportId) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM analysis_results WHERE analysis_kind = ?1",
        params![format!("compare:{import_id}")],
    )?;
    let removed = tx.execute("DELETE FROM imports WHERE id = ?1", params![import_id])?;
    tx.commit()?;
    Ok(removed > 0)
}

/// Rewrite `depth` and `closure_size` for every listed node in one
/// transaction. Nodes of the import that are not listed get `NULL` for both.
#[instrument(skip(conn, rows), fields(count = rows.len()))]
pub fn write_depths_and_closures(
    conn: &Connection,
    import_id: ImportId,
    rows: &[DerivedFields],
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE nodes SET depth = NULL, closure_size = NULL WHERE import_id = ?1",
        params![import_id],
    )?;
    let mut updated = 0;
    {
        let mut stmt = tx.prepare(
            "UPDATE nodes SET depth = ?1, closure_size = ?2 WHERE import_id = ?3 AND id = ?4",
        )?;
        for field in rows {
            updated += stmt.execute(params![
                field.depth,
                saturating_i64(field.closure_size),
                import_id,
                field.node_id
            ])?;
        }
    }
    tx.commit()?;
    debug!(import_id, updated, "wrote depths and closure sizes");
    Ok(updated)
}

/// Reset every edge of the import to non-redundant, then flag `redundant`.
///
/// Returns the number of edges whose flag actually changed, so running the
/// same pass twice reports zero the second time.
#[instrument(skip(conn, redundant), fields(count = redundant.len()))]
pub fn mark_redundant_edges(
    conn: &Connection,
    import_id: ImportId,
    redundant: &[EdgeId],
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;

    let previous: HashSet<EdgeId> = {
        let mut stmt =
            tx.prepare("SELECT id FROM edges WHERE import_id = ?1 AND is_redundant = 1")?;
        let ids = stmt
            .query_map(params![import_id], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<EdgeId>, _>>()?;
        ids
    };

    tx.execute(
        "UPDATE edges SET is_redundant = 0 WHERE import_id = ?1 AND is_redundant = 1",
        params![import_id],
    )?;

    let mut flagged: HashSet<EdgeId> = HashSet::with_capacity(redundant.len());
    {
        let mut stmt =
            tx.prepare("UPDATE edges SET is_redundant = 1 WHERE import_id = ?1 AND id = ?2")?;
        for &edge_id in redundant {
            if stmt.execute(params![import_id, edge_id])? > 0 {
                flagged.insert(edge_id);
            }
        }
    }
    tx.commit()?;

    Ok(previous.symmetric_difference(&flagged).count())
}

/// Rewrite contribution counts. Listed nodes get their counts; every other
/// node of the import is reset to `NULL`.
#[instrument(skip(conn, rows), fields(count = rows.len()))]
pub fn write_contributions(
    conn: &Connection,
    import_id: ImportId,
    rows: &[ContributionFields],
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE nodes SET unique_contribution = NULL, shared_contribution = NULL
         WHERE import_id = ?1",
        params![import_id],
    )?;
    let mut updated = 0;
    {
        let mut stmt = tx.prepare(
            "UPDATE nodes SET unique_contribution = ?1, shared_contribution = ?2
             WHERE import_id = ?3 AND id = ?4",
        )?;
        for field in rows {
            updated += stmt.execute(params![
                saturating_i64(field.unique_contribution),
                saturating_i64(field.shared_contribution),
                import_id,
                field.node_id
            ])?;
        }
    }
    tx.commit()?;
    Ok(updated)
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
