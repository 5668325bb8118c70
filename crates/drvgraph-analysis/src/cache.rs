//! Typed access to the `analysis_results` table.
//!
//! An entry is keyed by `(import_id, analysis kind)` and remembers the
//! content hash of the snapshot it was computed from. Readers that hold a
//! snapshot ask for a *fresh* entry; a hash mismatch counts as a miss and the
//! analysis is recomputed and upserted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use drvgraph_core::db::results;
use drvgraph_core::model::{ImportId, NodeId, ParseEnumError};
use drvgraph_core::{AnalysisContext, Result};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// What a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    Depths,
    ClosureSizes,
    Loops,
    Redundancy,
    Summary,
    Contributions,
    /// Attribution bundle for one target node.
    WhyChain(NodeId),
    /// Comparison against another import; owned by the smaller import id.
    Compare(ImportId),
}

impl AnalysisKind {
    /// Stored `analysis_kind` string.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Depths => "depths".to_string(),
            Self::ClosureSizes => "closure_sizes".to_string(),
            Self::Loops => "loops".to_string(),
            Self::Redundancy => "redundancy".to_string(),
            Self::Summary => "summary".to_string(),
            Self::Contributions => "contributions".to_string(),
            Self::WhyChain(node_id) => format!("why_chain:{node_id}"),
            Self::Compare(other) => format!("compare:{other}"),
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for AnalysisKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || ParseEnumError {
            expected: "analysis kind",
            got: s.to_string(),
        };
        match s {
            "depths" => Ok(Self::Depths),
            "closure_sizes" => Ok(Self::ClosureSizes),
            "loops" => Ok(Self::Loops),
            "redundancy" => Ok(Self::Redundancy),
            "summary" => Ok(Self::Summary),
            "contributions" => Ok(Self::Contributions),
            _ => {
                if let Some(raw) = s.strip_prefix("why_chain:") {
                    raw.parse().map(Self::WhyChain).map_err(|_| invalid())
                } else if let Some(raw) = s.strip_prefix("compare:") {
                    raw.parse().map(Self::Compare).map_err(|_| invalid())
                } else {
                    Err(invalid())
                }
            }
        }
    }
}

/// A decoded cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAnalysis<T> {
    pub payload: T,
    pub computed_at: DateTime<Utc>,
    /// Content hash of the snapshot the payload was computed from.
    pub graph_hash: String,
}

impl<T> CachedAnalysis<T> {
    /// Whether this entry was computed from a snapshot with `graph_hash`.
    #[must_use]
    pub fn is_fresh(&self, graph_hash: &str) -> bool {
        self.graph_hash == graph_hash
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CachedAnalysis<U> {
        CachedAnalysis {
            payload: f(self.payload),
            computed_at: self.computed_at,
            graph_hash: self.graph_hash,
        }
    }
}

/// Cache handle scoped to one request's connection.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisCache<'conn> {
    conn: &'conn Connection,
}

impl<'conn> AnalysisCache<'conn> {
    #[must_use]
    pub const fn new(ctx: &AnalysisContext<'conn>) -> Self {
        Self { conn: ctx.conn() }
    }

    /// Read an entry regardless of freshness.
    pub fn get<T: DeserializeOwned>(
        &self,
        import_id: ImportId,
        kind: &AnalysisKind,
    ) -> Result<Option<CachedAnalysis<T>>> {
        let Some(stored) = results::get_result(self.conn, import_id, &kind.key())? else {
            return Ok(None);
        };
        Ok(Some(CachedAnalysis {
            payload: serde_json::from_str(&stored.payload_json)?,
            computed_at: stored.computed_at,
            graph_hash: stored.graph_hash,
        }))
    }

    /// Read an entry only if it was computed from `graph_hash`.
    pub fn get_fresh<T: DeserializeOwned>(
        &self,
        import_id: ImportId,
        kind: &AnalysisKind,
        graph_hash: &str,
    ) -> Result<Option<CachedAnalysis<T>>> {
        let Some(stored) = results::get_result(self.conn, import_id, &kind.key())? else {
            return Ok(None);
        };
        if stored.graph_hash != graph_hash {
            debug!(import_id, kind = %kind, "cache entry is stale");
            return Ok(None);
        }
        Ok(Some(CachedAnalysis {
            payload: serde_json::from_str(&stored.payload_json)?,
            computed_at: stored.computed_at,
            graph_hash: stored.graph_hash,
        }))
    }

    /// Upsert an entry. Last writer wins.
    #[instrument(skip(self, payload), fields(kind = %kind))]
    pub fn put<T: Serialize>(
        &self,
        import_id: ImportId,
        kind: &AnalysisKind,
        payload: &T,
        graph_hash: &str,
    ) -> Result<DateTime<Utc>> {
        let payload_json = serde_json::to_string(payload)?;
        let computed_at =
            results::upsert_result(self.conn, import_id, &kind.key(), &payload_json, graph_hash)?;
        info!(import_id, bytes = payload_json.len(), "cached analysis result");
        Ok(computed_at)
    }

    /// Serve a fresh entry, or run `compute` and cache its output.
    pub fn get_or_compute<T, F>(
        &self,
        import_id: ImportId,
        kind: &AnalysisKind,
        graph_hash: &str,
        compute: F,
    ) -> Result<CachedAnalysis<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(hit) = self.get_fresh(import_id, kind, graph_hash)? {
            debug!(import_id, kind = %kind, "analysis cache hit");
            return Ok(hit);
        }
        let payload = compute()?;
        let computed_at = self.put(import_id, kind, &payload, graph_hash)?;
        Ok(CachedAnalysis {
            payload,
            computed_at,
            graph_hash: graph_hash.to_string(),
        })
    }

    /// Kinds cached for an import. Rows whose kind this build does not
    /// recognize are skipped.
    pub fn list(&self, import_id: ImportId) -> Result<Vec<(AnalysisKind, DateTime<Utc>)>> {
        let rows = results::list_results(self.conn, import_id)?;
        Ok(rows
            .into_iter()
            .filter_map(|(raw, computed_at)| match raw.parse::<AnalysisKind>() {
                Ok(kind) => Some((kind, computed_at)),
                Err(err) => {
                    warn!(import_id, %err, "skipping unknown cached analysis kind");
                    None
                }
            })
            .collect())
    }

    /// Drop every entry owned by an import.
    pub fn invalidate(&self, import_id: ImportId) -> Result<usize> {
        let removed = results::delete_results(self.conn, import_id)?;
        debug!(import_id, removed, "invalidated cached analyses");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drvgraph_core::db::{open_in_memory, write};
    use std::cell::Cell;

    #[test]
    fn kind_keys_round_trip() {
        for kind in [
            AnalysisKind::Depths,
            AnalysisKind::ClosureSizes,
            AnalysisKind::Loops,
            AnalysisKind::Redundancy,
            AnalysisKind::Summary,
            AnalysisKind::Contributions,
            AnalysisKind::WhyChain(42),
            AnalysisKind::Compare(7),
        ] {
            assert_eq!(kind.key().parse::<AnalysisKind>(), Ok(kind));
        }
        assert!("why_chain:abc".parse::<AnalysisKind>().is_err());
        assert!("pagerank".parse::<AnalysisKind>().is_err());
    }

    #[test]
    fn stale_entries_are_recomputed() {
        let conn = open_in_memory().expect("open store");
        let import_id = write::create_import(&conn, "sys").expect("import");
        let ctx = AnalysisContext::with_defaults(&conn);
        let cache = AnalysisCache::new(&ctx);
        let calls = Cell::new(0);

        let compute = |value: u32| {
            calls.set(calls.get() + 1);
            Ok(value)
        };

        let first = cache
            .get_or_compute(import_id, &AnalysisKind::Summary, "blake3:a", || compute(1))
            .expect("first");
        let hit = cache
            .get_or_compute(import_id, &AnalysisKind::Summary, "blake3:a", || compute(2))
            .expect("hit");
        let stale = cache
            .get_or_compute(import_id, &AnalysisKind::Summary, "blake3:b", || compute(3))
            .expect("stale");

        assert_eq!(first.payload, 1);
        assert_eq!(hit.payload, 1);
        assert_eq!(stale.payload, 3);
        assert_eq!(calls.get(), 2);

        let any: CachedAnalysis<u32> = cache
            .get(import_id, &AnalysisKind::Summary)
            .expect("get")
            .expect("present");
        assert!(any.is_fresh("blake3:b"));
    }

    #[test]
    fn list_and_invalidate() {
        let conn = open_in_memory().expect("open store");
        let import_id = write::create_import(&conn, "sys").expect("import");
        let ctx = AnalysisContext::with_defaults(&conn);
        let cache = AnalysisCache::new(&ctx);

        cache
            .put(import_id, &AnalysisKind::Loops, &"x", "blake3:a")
            .expect("put");
        cache
            .put(import_id, &AnalysisKind::WhyChain(3), &"y", "blake3:a")
            .expect("put");
        results::upsert_result(&conn, import_id, "legacy_metric", "{}", "blake3:a")
            .expect("raw upsert");

        let kinds: Vec<AnalysisKind> = cache
            .list(import_id)
            .expect("list")
            .into_iter()
            .map(|(kind, _)| kind)
            .collect();
        assert_eq!(kinds, vec![AnalysisKind::Loops, AnalysisKind::WhyChain(3)]);

        assert_eq!(cache.invalidate(import_id).expect("invalidate"), 3);
        assert!(cache
            .get::<String>(import_id, &AnalysisKind::Loops)
            .expect("get")
            .is_none());
    }

    #[test]
    fn corrupt_payload_surfaces_as_error() {
        let conn = open_in_memory().expect("open store");
        let import_id = write::create_import(&conn, "sys").expect("import");
        results::upsert_result(&conn, import_id, "loops", "not json", "blake3:a").expect("upsert");

        let ctx = AnalysisContext::with_defaults(&conn);
        let err = AnalysisCache::new(&ctx)
            .get::<u32>(import_id, &AnalysisKind::Loops)
            .expect_err("corrupt");
        assert_eq!(err.code(), drvgraph_core::ErrorCode::CorruptPayload);
    }
}
