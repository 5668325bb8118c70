//! The `analysis_results` table: one cached payload per
//! `(import_id, analysis_kind)`.
//!
//! Rows are upserted, never appended. Recomputing the same entry twice is
//! harmless; the last writer wins.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::now_us;
use super::query::micros_to_datetime;
use crate::error::Result;
use crate::model::ImportId;

/// A cached payload as stored, still JSON-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResult {
    pub analysis_kind: String,
    pub payload_json: String,
    /// Content hash of the graph snapshot the payload was computed from.
    pub graph_hash: String,
    pub computed_at: DateTime<Utc>,
}

/// Insert or replace the cached payload for `(import_id, analysis_kind)`.
///
/// Returns the timestamp recorded for the entry.
pub fn upsert_result(
    conn: &Connection,
    import_id: ImportId,
    analysis_kind: &str,
    payload_json: &str,
    graph_hash: &str,
) -> Result<DateTime<Utc>> {
    let computed_at_us = now_us();
    conn.execute(
        "INSERT INTO analysis_results (import_id, analysis_kind, payload_json, graph_hash, computed_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (import_id, analysis_kind) DO UPDATE SET
             payload_json = excluded.payload_json,
             graph_hash = excluded.graph_hash,
             computed_at_us = excluded.computed_at_us",
        params![import_id, analysis_kind, payload_json, graph_hash, computed_at_us],
    )?;
    Ok(micros_to_datetime(computed_at_us))
}

/// Fetch the cached payload for `(import_id, analysis_kind)`, if any.
pub fn get_result(
    conn: &Connection,
    import_id: ImportId,
    analysis_kind: &str,
) -> Result<Option<StoredResult>> {
    Ok(conn
        .query_row(
            "SELECT analysis_kind, payload_json, graph_hash, computed_at_us
             FROM analysis_results
             WHERE import_id = ?1 AND analysis_kind = ?2",
            params![import_id, analysis_kind],
            |row| {
                Ok(StoredResult {
                    analysis_kind: row.get(0)?,
                    payload_json: row.get(1)?,
                    graph_hash: row.get(2)?,
                    computed_at: micros_to_datetime(row.get(3)?),
                })
            },
        )
        .optional()?)
}

/// Kinds cached for an import with their timestamps, sorted by kind.
pub fn list_results(
    conn: &Connection,
    import_id: ImportId,
) -> Result<Vec<(String, DateTime<Utc>)>> {
    let mut stmt = conn.prepare(
        "SELECT analysis_kind, computed_at_us
         FROM analysis_results
         WHERE import_id = ?1
         ORDER BY analysis_kind",
    )?;
    let rows = stmt
        .query_map(params![import_id], |row| {
            Ok((row.get::<_, String>(0)?, micros_to_datetime(row.get(1)?)))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Drop every cached payload owned by an import.
pub fn delete_results(conn: &Connection, import_id: ImportId) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM analysis_results WHERE import_id = ?1",
        params![import_id],
    )?)
}
