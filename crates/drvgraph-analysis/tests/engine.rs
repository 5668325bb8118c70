//! End-to-end scenarios against an in-memory store.
//!
//! Each test seeds one or more imports through the write API, then drives
//! the engine exactly the way a collaborator would: by import id, through an
//! `AnalysisContext`.

use std::collections::HashMap;

use drvgraph_analysis::attribution::{RemovalImpact, classify_removal_impact, why_chain};
use drvgraph_analysis::compare::{DiffType, compare_imports};
use drvgraph_analysis::depth::{compute_closure_sizes, compute_depths};
use drvgraph_analysis::graph::{find_loops, loops_for_import, summary_for_import};
use drvgraph_analysis::redundancy::mark_redundant_edges;
use drvgraph_analysis::refresh::refresh_import;
use drvgraph_analysis::{AnalysisCache, AnalysisKind, GraphSnapshot};
use drvgraph_core::db::{open_in_memory, open_store, query, write};
use drvgraph_core::model::{ImportId, NewEdge, NewNode, NodeId};
use drvgraph_core::{AnalysisConfig, AnalysisContext, ErrorCode};
use rusqlite::Connection;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A seeded import: its id plus label → node id.
struct Seeded {
    import_id: ImportId,
    ids: HashMap<String, NodeId>,
}

impl Seeded {
    fn id(&self, label: &str) -> NodeId {
        self.ids[label]
    }
}

/// Seed an import. Node hashes are `h-<label>` unless listed in `hashes`;
/// labels in `tops` are top-level.
fn seed_with(
    conn: &Connection,
    name: &str,
    labels: &[&str],
    tops: &[&str],
    hashes: &[(&str, &str)],
    edges: &[(&str, &str)],
) -> Seeded {
    let import_id = write::create_import(conn, name).expect("create import");
    let nodes: Vec<NewNode> = labels
        .iter()
        .map(|&label| {
            let hash = hashes
                .iter()
                .find(|(l, _)| *l == label)
                .map_or_else(|| format!("h-{label}"), |(_, h)| (*h).to_string());
            let node = NewNode::new(hash, label);
            if tops.contains(&label) { node.top_level() } else { node }
        })
        .collect();
    let node_ids = write::insert_nodes(conn, import_id, &nodes).expect("insert nodes");
    let ids: HashMap<String, NodeId> = labels
        .iter()
        .map(|label| (*label).to_string())
        .zip(node_ids)
        .collect();

    let new_edges: Vec<NewEdge> = edges
        .iter()
        .map(|(s, t)| NewEdge::new(ids[*s], ids[*t]))
        .collect();
    write::insert_edges(conn, import_id, &new_edges).expect("insert edges");

    Seeded { import_id, ids }
}

fn seed(conn: &Connection, labels: &[&str], tops: &[&str], edges: &[(&str, &str)]) -> Seeded {
    seed_with(conn, "import", labels, tops, &[], edges)
}

fn store() -> Connection {
    init_tracing();
    open_in_memory().expect("open in-memory store")
}

// ---------------------------------------------------------------------------
// Cycles
// ---------------------------------------------------------------------------

#[test]
fn three_cycle_plus_isolated_node_yields_one_cycle() {
    let conn = store();
    let import = seed(
        &conn,
        &["a", "b", "c", "d"],
        &[],
        &[("a", "b"), ("b", "c"), ("c", "a")],
    );
    let ctx = AnalysisContext::with_defaults(&conn);
    let snapshot = GraphSnapshot::load(&ctx, import.import_id).expect("load");

    let report = loops_for_import(&ctx, &snapshot).expect("loops");
    assert!(report.has_cycles);
    assert_eq!(report.cycle_count, 1);
    let mut expected = vec![import.id("a"), import.id("b"), import.id("c")];
    expected.sort_unstable();
    assert_eq!(report.cycles[0].node_ids, expected);
    assert_eq!(report.cycles[0].size, 3);
    assert_eq!(report.cycles[0].path.first(), Some(&import.id("a")));
    assert_eq!(report.cycles[0].path.last(), Some(&import.id("a")));

    // Every member of the cycle reaches the two others.
    let closures = compute_closure_sizes(&snapshot);
    for label in ["a", "b", "c"] {
        assert_eq!(closures.get(import.id(label)), Some(2), "{label}");
    }
    assert_eq!(closures.get(import.id("d")), Some(0));

    // Served from cache the second time, identical result.
    assert_eq!(loops_for_import(&ctx, &snapshot).expect("loops again"), report);
    assert_eq!(find_loops(&snapshot), report);
}

// ---------------------------------------------------------------------------
// Redundancy
// ---------------------------------------------------------------------------

#[test]
fn triangle_marks_only_the_shortcut_and_is_idempotent() {
    let conn = store();
    let import = seed(
        &conn,
        &["a", "b", "c"],
        &[],
        &[("a", "b"), ("b", "c"), ("a", "c")],
    );
    let ctx = AnalysisContext::with_defaults(&conn);
    let snapshot = GraphSnapshot::load(&ctx, import.import_id).expect("load");

    let first = mark_redundant_edges(&ctx, &snapshot).expect("mark");
    assert_eq!(first.changed, 1);
    assert!(!first.report.exact);
    assert!(!first.report.truncated);

    let flagged: Vec<(NodeId, NodeId)> = query::list_edges(&conn, import.import_id)
        .expect("edges")
        .into_iter()
        .filter(|edge| edge.is_redundant)
        .map(|edge| (edge.source_id, edge.target_id))
        .collect();
    assert_eq!(flagged, vec![(import.id("a"), import.id("c"))]);

    let second = mark_redundant_edges(&ctx, &snapshot).expect("mark again");
    assert_eq!(second.changed, 0);
    assert_eq!(second.report.redundant_edge_ids, first.report.redundant_edge_ids);
}

#[test]
fn edge_limit_truncates_and_flags_stay_consistent() {
    let conn = store();
    let import = seed(
        &conn,
        &["a", "b", "c"],
        &[],
        &[("a", "b"), ("b", "c"), ("a", "c")],
    );
    let mut config = AnalysisConfig::default();
    config.redundancy.max_edges = 1;
    let ctx = AnalysisContext::new(&conn, config);
    let snapshot = GraphSnapshot::load(&ctx, import.import_id).expect("load");

    let outcome = mark_redundant_edges(&ctx, &snapshot).expect("mark");
    assert!(outcome.report.truncated);
    assert!(outcome.report.edges_examined < outcome.report.edges_total);
    let stored = query::redundant_edge_ids(&conn, import.import_id).expect("flags");
    assert_eq!(stored, outcome.report.redundant_edge_ids);
}

// ---------------------------------------------------------------------------
// Attribution
// ---------------------------------------------------------------------------

#[test]
fn diamond_attribution_end_to_end() {
    let conn = store();
    let import = seed(
        &conn,
        &["t1", "a", "b", "c", "stray"],
        &["t1"],
        &[("t1", "a"), ("t1", "b"), ("a", "c"), ("b", "c")],
    );
    let ctx = AnalysisContext::with_defaults(&conn);
    let snapshot = GraphSnapshot::load(&ctx, import.import_id).expect("load");

    let closures = compute_closure_sizes(&snapshot);
    assert_eq!(closures.get(import.id("t1")), Some(3));

    let chain = why_chain(&ctx, &snapshot, import.id("c")).expect("why chain");
    assert_eq!(chain.paths.len(), 2);
    for path in &chain.paths {
        assert_eq!(path.top_level_id(), Some(import.id("t1")));
        assert_eq!(path.target_id(), Some(import.id("c")));
    }
    assert_eq!(chain.groups.len(), 2);
    let vias: Vec<NodeId> = chain.groups.iter().map(|g| g.via_node_id).collect();
    assert!(vias.contains(&import.id("a")));
    assert!(vias.contains(&import.id("b")));
    for group in &chain.groups {
        assert_eq!(group.top_level_ids, vec![import.id("t1")]);
        assert_eq!(group.top_level_labels, vec!["t1".to_string()]);
    }
    assert_eq!(chain.impact, RemovalImpact::Essential);
    assert!(!chain.truncated);

    let stray = classify_removal_impact(&ctx, &snapshot, import.id("stray")).expect("classify");
    assert_eq!(stray, RemovalImpact::Orphan);
}

#[test]
fn why_chain_is_cached_and_respects_bounds() {
    let conn = store();
    let import = seed(
        &conn,
        &["t1", "a", "b", "c"],
        &["t1"],
        &[("t1", "a"), ("t1", "b"), ("a", "c"), ("b", "c")],
    );
    let ctx = AnalysisContext::with_defaults(&conn);
    let snapshot = GraphSnapshot::load(&ctx, import.import_id).expect("load");
    let target = import.id("c");

    let first = why_chain(&ctx, &snapshot, target).expect("first");
    let cache = AnalysisCache::new(&ctx);
    let hit = cache
        .get_fresh::<serde_json::Value>(
            import.import_id,
            &AnalysisKind::WhyChain(target),
            &snapshot.content_hash,
        )
        .expect("read cache");
    assert!(hit.is_some());
    assert_eq!(why_chain(&ctx, &snapshot, target).expect("second"), first);

    let mut config = AnalysisConfig::default();
    config.attribution.max_paths = 1;
    let bounded_ctx = AnalysisContext::new(&conn, config);
    let bounded = why_chain(&bounded_ctx, &snapshot, target).expect("bounded");
    assert_eq!(bounded.paths.len(), 1);
    assert!(bounded.truncated);
    assert_eq!(bounded.impact, RemovalImpact::Essential);
}

#[test]
fn top_level_target_has_trivial_path() {
    let conn = store();
    let import = seed(&conn, &["t1", "a"], &["t1"], &[("t1", "a")]);
    let ctx = AnalysisContext::with_defaults(&conn);
    let snapshot = GraphSnapshot::load(&ctx, import.import_id).expect("load");

    let chain = why_chain(&ctx, &snapshot, import.id("t1")).expect("chain");
    assert_eq!(chain.paths.len(), 1);
    assert!(chain.paths[0].is_trivial());
    assert_eq!(chain.groups.len(), 1);
    assert_eq!(chain.groups[0].via_node_id, import.id("t1"));
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

#[test]
fn comparing_an_import_with_itself_is_all_same() {
    let conn = store();
    let import = seed(
        &conn,
        &["t1", "a", "b", "c"],
        &["t1"],
        &[("t1", "a"), ("t1", "b"), ("a", "c"), ("b", "c")],
    );
    let ctx = AnalysisContext::with_defaults(&conn);

    let comparison = compare_imports(&ctx, import.import_id, import.import_id).expect("compare");
    assert_eq!(comparison.same_count, 4);
    assert_eq!(comparison.left_total, 4);
    assert_eq!(comparison.different_count, 0);
    assert_eq!(comparison.left_only_count, 0);
    assert_eq!(comparison.right_only_count, 0);
    assert!(comparison.differences.is_empty());
}

#[test]
fn reversed_comparison_is_the_flipped_result() {
    let conn = store();
    let old = seed_with(
        &conn,
        "old",
        &["app", "openssl", "zlib"],
        &["app"],
        &[],
        &[("app", "openssl"), ("openssl", "zlib")],
    );
    let new = seed_with(
        &conn,
        "new",
        &["app", "openssl", "zlib", "brotli"],
        &["app"],
        &[("openssl", "h-openssl-3")],
        &[("app", "openssl"), ("openssl", "zlib"), ("openssl", "brotli")],
    );
    let ctx = AnalysisContext::with_defaults(&conn);

    let forward = compare_imports(&ctx, old.import_id, new.import_id).expect("forward");
    assert_eq!(forward.left_import_id, old.import_id);
    assert_eq!(forward.same_count, 2);
    assert_eq!(forward.different_count, 1);
    assert_eq!(forward.left_only_count, 0);
    assert_eq!(forward.right_only_count, 1);

    let openssl = forward
        .differences
        .iter()
        .find(|diff| diff.label == "openssl")
        .expect("openssl diff");
    assert_eq!(openssl.diff_type, DiffType::DifferentHash);
    assert_eq!(openssl.closure_delta, 1);

    let brotli = forward
        .differences
        .iter()
        .find(|diff| diff.label == "brotli")
        .expect("brotli diff");
    assert_eq!(brotli.diff_type, DiffType::OnlyRight);

    let backward = compare_imports(&ctx, new.import_id, old.import_id).expect("backward");
    assert_eq!(backward, forward.clone().flip());
    assert_eq!(backward.left_import_id, new.import_id);
    assert_eq!(backward.left_only_count, 1);
    assert_eq!(backward.right_only_count, 0);

    // One entry, owned by the smaller import id.
    let owner = old.import_id.min(new.import_id);
    let other = old.import_id.max(new.import_id);
    let kinds: Vec<AnalysisKind> = AnalysisCache::new(&ctx)
        .list(owner)
        .expect("list")
        .into_iter()
        .map(|(kind, _)| kind)
        .collect();
    assert_eq!(kinds, vec![AnalysisKind::Compare(other)]);
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn unknown_import_and_node_are_not_found() {
    let conn = store();
    let ctx = AnalysisContext::with_defaults(&conn);

    let err = GraphSnapshot::load(&ctx, 404).expect_err("no import");
    assert_eq!(err.code(), ErrorCode::ImportNotFound);
    assert!(err.is_not_found());

    let import = seed(&conn, &["a"], &[], &[]);
    let snapshot = GraphSnapshot::load(&ctx, import.import_id).expect("load");
    let err = why_chain(&ctx, &snapshot, 9_999).expect_err("no node");
    assert_eq!(err.code(), ErrorCode::NodeNotFound);

    let err = compare_imports(&ctx, import.import_id, 404).expect_err("no right import");
    assert!(err.is_not_found());
}

#[test]
fn edge_into_another_import_is_invalid() {
    let conn = store();
    let first = seed(&conn, &["a"], &[], &[]);
    let second = seed(&conn, &["b"], &[], &[]);
    write::insert_edges(
        &conn,
        first.import_id,
        &[NewEdge::new(first.id("a"), second.id("b"))],
    )
    .expect("insert cross-import edge");

    let ctx = AnalysisContext::with_defaults(&conn);
    let err = GraphSnapshot::load(&ctx, first.import_id).expect_err("invalid graph");
    assert_eq!(err.code(), ErrorCode::InvalidGraph);
}

#[test]
fn graph_without_edges_is_valid() {
    let conn = store();
    let import = seed(&conn, &["a", "b"], &["a"], &[]);
    let ctx = AnalysisContext::with_defaults(&conn);
    let snapshot = GraphSnapshot::load(&ctx, import.import_id).expect("load");

    let depths = compute_depths(&snapshot);
    assert_eq!(depths.depth(import.id("a")), Some(0));
    assert_eq!(depths.depth(import.id("b")), Some(0));
    let summary = summary_for_import(&ctx, &snapshot).expect("summary");
    assert_eq!(summary.edge_count, 0);
    assert_eq!(summary.isolated_count, 2);
}

// ---------------------------------------------------------------------------
// Cache lifecycle
// ---------------------------------------------------------------------------

#[test]
fn graph_change_makes_cached_entries_stale() {
    let conn = store();
    let import = seed(&conn, &["a", "b", "c"], &[], &[("a", "b")]);
    let ctx = AnalysisContext::with_defaults(&conn);
    let before = refresh_import(&ctx, import.import_id).expect("refresh");

    write::insert_edges(
        &conn,
        import.import_id,
        &[NewEdge::new(import.id("b"), import.id("c"))],
    )
    .expect("add edge");
    let snapshot = GraphSnapshot::load(&ctx, import.import_id).expect("reload");
    assert_ne!(snapshot.content_hash, before.graph_hash);

    let cache = AnalysisCache::new(&ctx);
    let stale = cache
        .get_fresh::<serde_json::Value>(import.import_id, &AnalysisKind::Summary, &snapshot.content_hash)
        .expect("read");
    assert!(stale.is_none());

    let summary = summary_for_import(&ctx, &snapshot).expect("summary");
    assert_eq!(summary.edge_count, 2);
    assert_eq!(summary.max_depth, Some(2));
}

#[test]
fn deleting_an_import_drops_its_results_and_comparisons() {
    let conn = store();
    let left = seed(&conn, &["a", "b"], &["a"], &[("a", "b")]);
    let right = seed(&conn, &["a", "c"], &["a"], &[("a", "c")]);
    let ctx = AnalysisContext::with_defaults(&conn);

    refresh_import(&ctx, left.import_id).expect("refresh");
    compare_imports(&ctx, left.import_id, right.import_id).expect("compare");
    let cache = AnalysisCache::new(&ctx);
    assert!(!cache.list(left.import_id).expect("list").is_empty());

    assert!(write::delete_import(&conn, left.import_id).expect("delete"));
    assert!(cache.list(left.import_id).expect("list").is_empty());
    assert!(query::list_nodes(&conn, left.import_id).expect("nodes").is_empty());
    assert_eq!(
        query::get_import(&conn, left.import_id).expect_err("gone").code(),
        ErrorCode::ImportNotFound
    );
    assert_eq!(query::list_nodes(&conn, right.import_id).expect("nodes").len(), 2);
}

#[test]
fn refreshed_fields_and_cache_survive_reopen() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("drvgraph.sqlite3");

    let (import, report) = {
        let conn = open_store(&path).expect("open store");
        let import = seed(
            &conn,
            &["app", "zlib", "libc"],
            &["app"],
            &[("app", "zlib"), ("zlib", "libc"), ("app", "libc")],
        );
        let ctx = AnalysisContext::with_defaults(&conn);
        let report = refresh_import(&ctx, import.import_id).expect("refresh");
        (import, report)
    };
    assert_eq!(report.redundant_changed, 1);

    let conn = open_store(&path).expect("reopen store");
    let app = query::get_node(&conn, import.import_id, import.id("app")).expect("app");
    assert_eq!(app.depth, Some(0));
    assert_eq!(app.closure_size, Some(2));
    assert_eq!(app.unique_contribution, Some(2));
    assert_eq!(app.shared_contribution, Some(0));
    let libc = query::get_node(&conn, import.import_id, import.id("libc")).expect("libc");
    assert_eq!(libc.depth, Some(1));
    assert_eq!(libc.closure_size, Some(0));

    let flagged: Vec<(NodeId, NodeId)> = query::list_edges(&conn, import.import_id)
        .expect("edges")
        .into_iter()
        .filter(|edge| edge.is_redundant)
        .map(|edge| (edge.source_id, edge.target_id))
        .collect();
    assert_eq!(flagged, vec![(import.id("app"), import.id("libc"))]);

    let ctx = AnalysisContext::with_defaults(&conn);
    let snapshot = GraphSnapshot::load(&ctx, import.import_id).expect("load");
    assert_eq!(snapshot.content_hash, report.graph_hash);
    let cached = AnalysisCache::new(&ctx)
        .get_fresh::<serde_json::Value>(import.import_id, &AnalysisKind::Summary, &snapshot.content_hash)
        .expect("read");
    assert!(cached.is_some());

    let again = refresh_import(&ctx, import.import_id).expect("refresh after reopen");
    assert_eq!(again.redundant_changed, 0);
    assert_eq!(again.summary, report.summary);
}
