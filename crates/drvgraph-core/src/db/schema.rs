//! Reference SQLite schema for the graph store.
//!
//! The engine reads and writes exactly these tables:
//! - `imports` is the snapshot boundary; deleting a row cascades everywhere
//! - `nodes` holds one derivation per row, unique by `(import_id, drv_hash)`
//! - `edges` holds `source depends on target`, unique per import and pair
//! - `analysis_results` caches one payload per `(import_id, analysis_kind)`
//! - `store_meta` records the applied schema version

/// Migration v1: graph tables, analysis cache and store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY,
    import_id INTEGER NOT NULL REFERENCES imports(id) ON DELETE CASCADE,
    drv_hash TEXT NOT NULL CHECK (length(trim(drv_hash)) > 0),
    label TEXT NOT NULL,
    package_type TEXT,
    is_top_level INTEGER NOT NULL DEFAULT 0 CHECK (is_top_level IN (0, 1)),
    depth INTEGER CHECK (depth IS NULL OR depth >= 0),
    closure_size INTEGER CHECK (closure_size IS NULL OR closure_size >= 0),
    unique_contribution INTEGER,
    shared_contribution INTEGER,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    UNIQUE (import_id, drv_hash)
);

CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY,
    import_id INTEGER NOT NULL REFERENCES imports(id) ON DELETE CASCADE,
    source_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    target_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    dependency_type TEXT NOT NULL DEFAULT 'unknown'
        CHECK (dependency_type IN ('build', 'runtime', 'unknown')),
    is_redundant INTEGER NOT NULL DEFAULT 0 CHECK (is_redundant IN (0, 1)),
    UNIQUE (import_id, source_id, target_id),
    CHECK (source_id <> target_id)
);

CREATE TABLE IF NOT EXISTS analysis_results (
    import_id INTEGER NOT NULL REFERENCES imports(id) ON DELETE CASCADE,
    analysis_kind TEXT NOT NULL CHECK (length(trim(analysis_kind)) > 0),
    payload_json TEXT NOT NULL,
    graph_hash TEXT NOT NULL,
    computed_at_us INTEGER NOT NULL,
    PRIMARY KEY (import_id, analysis_kind)
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 0);

CREATE INDEX IF NOT EXISTS idx_nodes_import ON nodes(import_id, id);
CREATE INDEX IF NOT EXISTS idx_nodes_import_label ON nodes(import_id, label);
CREATE INDEX IF NOT EXISTS idx_nodes_top_level ON nodes(import_id) WHERE is_top_level = 1;
CREATE INDEX IF NOT EXISTS idx_edges_import ON edges(import_id, id);
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
";

/// Indexes the migration tests expect to exist after migrating.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_nodes_import",
    "idx_nodes_import_label",
    "idx_nodes_top_level",
    "idx_edges_import",
    "idx_edges_source",
    "idx_edges_target",
];
