//! Integration tests for RepoGenome
//!
//! Full pipeline runs against throwaway repositories: scan, persist,
//! reload, serve, and the cross-cutting genome properties.

use std::fs;
use std::path::Path;

use serde_json::json;

use genome_core::{encode, CancelToken, EncodeMode, EngineConfig, FixedClock, NodeId, StaticHistory};
use genome_engine::Engine;
use genome_server::protocol::{Frame, FrameKind};
use genome_server::GenomeServer;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn engine(root: &Path) -> Engine {
    let clock = FixedClock(
        chrono::DateTime::parse_from_rfc3339("2024-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc),
    );
    Engine::with_capabilities(
        root,
        EngineConfig::default(),
        Box::new(StaticHistory::new()),
        Box::new(clock),
    )
    .unwrap()
}

fn seed_polyglot_repo(root: &Path) {
    write(
        root,
        "main.py",
        "import services.auth\n\ndef main():\n    services.auth.login()\n\nif __name__ == \"__main__\":\n    main()\n",
    );
    write(
        root,
        "services/auth.py",
        "def login():\n    \"\"\"authenticate and open a session\"\"\"\n    query_db()\n\ndef query_db():\n    pass\n",
    );
    write(
        root,
        "tests/test_auth.py",
        "def test_login():\n    assert True\n",
    );
    write(root, "config/app.yaml", "server:\n  port: 8080\nlogging:\n  level: info\n");
    write(root, "web/app.ts", "export function render() {}\n");
}

#[test]
fn full_pipeline_over_a_polyglot_repo() {
    let dir = tempfile::tempdir().unwrap();
    seed_polyglot_repo(dir.path());
    let engine = engine(dir.path());
    let stats = engine.scan(false, &CancelToken::unbounded()).unwrap();
    assert!(stats.nodes > 5);
    assert!(!stats.partial);

    let genome = engine.snapshot().unwrap();
    // Structural expectations across languages and kinds.
    assert!(genome.nodes.contains_key(&NodeId::from("main.py")));
    assert!(genome.nodes.contains_key(&NodeId::from("services/auth.login")));
    assert!(genome.nodes.contains_key(&NodeId::from("config/app.server")));
    assert!(genome.nodes.contains_key(&NodeId::from("web/app.render")));
    assert!(genome
        .has_edge(&"main.py".into(), &"services/auth.py".into(), genome_core::EdgeType::Imports));
    // Entry point, flow, and test linkage all derive.
    assert!(genome.summary.entry_points.contains(&NodeId::from("main.py")));
    assert!(!genome.flows.is_empty());
    assert!(genome
        .edges
        .iter()
        .any(|e| e.edge_type == genome_core::EdgeType::Tests));
    // Concepts group the services directory.
    assert!(genome
        .concepts
        .iter()
        .any(|c| c.id == NodeId::concept("services")));
}

#[test]
fn every_serialization_mode_round_trips_the_scan() {
    let dir = tempfile::tempdir().unwrap();
    seed_polyglot_repo(dir.path());
    let engine = engine(dir.path());
    engine.scan(false, &CancelToken::unbounded()).unwrap();
    let genome = engine.snapshot().unwrap();

    for mode in [EncodeMode::Standard, EncodeMode::Compact] {
        for gzip in [false, true] {
            let bytes = encode::save(&genome, mode, gzip).unwrap();
            let loaded = encode::load(&bytes).unwrap();
            assert!(
                loaded.content_eq(&genome),
                "round trip failed for {mode:?} gzip={gzip}"
            );
        }
    }
    // Lite keeps the required field set.
    let bytes = encode::save(&genome, EncodeMode::Lite, false).unwrap();
    let lite = encode::load(&bytes).unwrap();
    assert_eq!(lite.node_count(), genome.node_count());
    assert_eq!(lite.edge_count(), genome.edge_count());
}

#[test]
fn scan_then_noop_incremental_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    seed_polyglot_repo(dir.path());
    let engine = engine(dir.path());
    engine.scan(false, &CancelToken::unbounded()).unwrap();
    let first_bytes = fs::read(dir.path().join("repogenome.json")).unwrap();

    engine.scan(true, &CancelToken::unbounded()).unwrap();
    let second_bytes = fs::read(dir.path().join("repogenome.json")).unwrap();
    assert_eq!(first_bytes, second_bytes);
}

#[test]
fn server_session_walkthrough() {
    let dir = tempfile::tempdir().unwrap();
    seed_polyglot_repo(dir.path());
    let server = GenomeServer::new(engine(dir.path()));
    let call = |name: &str, payload: serde_json::Value| {
        server.handle(Frame {
            id: json!("t"),
            kind: FrameKind::Request,
            name: name.into(),
            payload,
        })
    };

    // scan, then the contract walkthrough: load → impact → update → query
    assert_eq!(call("scan", json!({})).kind, FrameKind::Response);
    assert_eq!(call("resource:current", json!({})).kind, FrameKind::Response);
    let impact = call(
        "impact",
        json!({"affected_nodes": ["services/auth.login"], "operation": "modify"}),
    );
    assert_eq!(impact.kind, FrameKind::Response);
    let blocked = call("query", json!({"predicate": {}}));
    assert_eq!(blocked.kind, FrameKind::Error);
    assert_eq!(blocked.payload["violation"], "missing-update");
    assert_eq!(
        call("update", json!({"reason": "edit applied"})).kind,
        FrameKind::Response
    );
    let page = call("query", json!({"predicate": {"type": "function"}}));
    assert_eq!(page.kind, FrameKind::Response);
    assert!(page.payload["total_count"].as_u64().unwrap() >= 2);

    // Exports land on disk.
    let export = call("export", json!({"format": "dot"}));
    assert_eq!(export.kind, FrameKind::Response);
    assert!(dir.path().join("repogenome.dot").exists());
}

#[test]
fn genome_invariants_hold_after_every_scan() {
    let dir = tempfile::tempdir().unwrap();
    seed_polyglot_repo(dir.path());
    let engine = engine(dir.path());
    engine.scan(false, &CancelToken::unbounded()).unwrap();
    assert!(engine.validate().unwrap().is_empty());

    write(dir.path(), "services/billing.py", "def charge():\n    pass\n");
    engine.scan(true, &CancelToken::unbounded()).unwrap();
    assert!(engine.validate().unwrap().is_empty());

    fs::remove_file(dir.path().join("services/auth.py")).unwrap();
    engine.scan(true, &CancelToken::unbounded()).unwrap();
    assert!(engine.validate().unwrap().is_empty());
}
