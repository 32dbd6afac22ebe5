//! Serving-layer tests: contract enforcement and end-to-end tool flows

use std::fs;
use std::path::Path;

use serde_json::{json, Value};

use genome_core::{EngineConfig, FixedClock, StaticHistory};
use genome_engine::Engine;

use crate::protocol::{Frame, FrameKind};
use crate::GenomeServer;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn server_for(root: &Path) -> GenomeServer {
    let clock = FixedClock(
        chrono::DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc),
    );
    let engine = Engine::with_capabilities(
        root,
        EngineConfig::default(),
        Box::new(StaticHistory::new()),
        Box::new(clock),
    )
    .unwrap();
    GenomeServer::new(engine)
}

fn call(server: &GenomeServer, name: &str, payload: Value) -> Frame {
    server.handle(Frame {
        id: json!(1),
        kind: FrameKind::Request,
        name: name.to_string(),
        payload,
    })
}

fn ok(server: &GenomeServer, name: &str, payload: Value) -> Value {
    let frame = call(server, name, payload);
    assert_eq!(
        frame.kind,
        FrameKind::Response,
        "{name} failed: {}",
        frame.payload
    );
    frame.payload
}

#[test]
fn update_without_load_is_a_contract_violation() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "def f():\n    pass\n");
    let server = server_for(dir.path());

    let frame = call(&server, "update", json!({"reason": "edit"}));
    assert_eq!(frame.kind, FrameKind::Error);
    assert_eq!(frame.payload["code"], "contract-violation");
    assert_eq!(frame.payload["violation"], "missing-load");
    // No genome was created by the rejected call.
    assert!(server.context().engine.snapshot().is_none());
}

#[test]
fn impact_then_query_requires_update() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "def f():\n    pass\nf()\n");
    let server = server_for(dir.path());
    ok(&server, "scan", json!({}));

    ok(
        &server,
        "impact",
        json!({"affected_nodes": ["a.f"], "operation": "delete"}),
    );
    let frame = call(&server, "query", json!({"predicate": {}}));
    assert_eq!(frame.kind, FrameKind::Error);
    assert_eq!(frame.payload["violation"], "missing-update");

    // `update` settles the debt and queries work again.
    ok(&server, "update", json!({"reason": "applied the edit"}));
    ok(&server, "query", json!({"predicate": {}}));
}

#[test]
fn fresh_validate_also_clears_the_debt() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "def f():\n    pass\nf()\n");
    let server = server_for(dir.path());
    ok(&server, "scan", json!({}));
    ok(
        &server,
        "impact",
        json!({"affected_nodes": ["a.f"], "operation": "modify"}),
    );
    let validation = ok(&server, "validate", json!({}));
    assert_eq!(validation["ok"], true);
    ok(&server, "query", json!({"predicate": {}}));
}

#[test]
fn high_fan_in_delete_requires_approval() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "auth.py", "def login_user():\n    pass\n");
    write(
        dir.path(),
        "main.py",
        "import auth\n\nif __name__ == \"__main__\":\n    auth.login_user()\n",
    );
    for i in 0..11 {
        write(
            dir.path(),
            &format!("caller_{i:02}.py"),
            "import auth\nauth.login_user()\n",
        );
    }
    let server = server_for(dir.path());
    ok(&server, "scan", json!({}));

    let impact = ok(
        &server,
        "impact",
        json!({"affected_nodes": ["auth.login_user"], "operation": "delete"}),
    );
    assert!(impact["risk"].as_f64().unwrap() >= 0.7);
    assert!(!impact["affected_flows"].as_array().unwrap().is_empty());
    assert_eq!(impact["requires_approval"], true);
}

#[test]
fn query_projection_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let mut body = String::new();
    for i in 0..5 {
        body.push_str(&format!("def handler_{i}():\n    pass\n\n"));
    }
    write(dir.path(), "api.py", &body);
    let server = server_for(dir.path());
    ok(&server, "scan", json!({}));

    let page = ok(
        &server,
        "query",
        json!({
            "predicate": {"type": "function", "language": "Python"},
            "fields": ["id", "f"],
            "ids_only": false,
            "page": 1,
            "page_size": 3,
        }),
    );
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    for item in items {
        let obj = item.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert!(obj.contains_key("id"));
        assert!(obj.contains_key("f"));
    }
    assert_eq!(page["total_count"], 5);
}

#[test]
fn resources_serve_views_and_count_as_loads() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "def f():\n    pass\nf()\n");
    let server = server_for(dir.path());
    ok(&server, "scan", json!({}));

    let current = ok(&server, "resource:current", json!({"session_id": "s2"}));
    assert!(current["nodes"].is_object());
    let brief = ok(&server, "resource:current/brief", json!({}));
    assert!(brief["nodes"]["a.py"].is_object());
    assert!(brief["nodes"]["a.f"].get("summary").is_none());
    let summary = ok(&server, "resource:summary?mode=brief", json!({}));
    assert!(summary["counts"].is_object());
    let stats = ok(&server, "resource:stats", json!({}));
    assert!(stats["nodes"].as_u64().unwrap() >= 2);
    let node = ok(&server, "resource:nodes/a.f?fields=id,t", json!({}));
    assert_eq!(node["t"], "function");

    // The resource load satisfies load-before-mutate for session s2.
    let frame = call(
        &server,
        "set_context_session",
        json!({"session_id": "s2", "state": {"pinned": []}}),
    );
    assert_eq!(frame.kind, FrameKind::Response);
}

#[test]
fn tool_calls_route_contexts_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "auth/login.py",
        "def login():\n    \"\"\"authenticate a session\"\"\"\n    pass\n",
    );
    write(
        dir.path(),
        "auth/token.py",
        "def issue():\n    pass\n",
    );
    let server = server_for(dir.path());
    ok(&server, "scan", json!({}));

    let context = ok(
        &server,
        "build_context",
        json!({"goal": "login authentication", "budget_tokens": 2000}),
    );
    let context_id = context["context_id"].as_str().unwrap();
    assert!(!context["items"].as_array().unwrap().is_empty());

    let trace = ok(&server, "explain_context", json!({"context_id": context_id}));
    assert_eq!(trace["goal"], "login authentication");

    // Queries feed the context feedback counters.
    ok(&server, "query", json!({"predicate": {"type": "function"}}));
    let feedback = ok(
        &server,
        "get_context_feedback",
        json!({"context_id": context_id}),
    );
    assert!(feedback["hits"].as_u64().unwrap() + feedback["misses"].as_u64().unwrap() > 0);

    let skeleton = ok(
        &server,
        "get_context_skeleton",
        json!({"goal": "login", "budget_tokens": 500}),
    );
    assert!(skeleton["top_items"].is_array());
}

#[test]
fn find_path_and_dependencies_tools() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "import b\nb.greet()\n");
    write(dir.path(), "b.py", "def greet():\n    pass\n");
    let server = server_for(dir.path());
    ok(&server, "scan", json!({}));

    let path = ok(
        &server,
        "find_path",
        json!({"from": "a.py", "to": "b.greet", "max_len": 3}),
    );
    assert!(path["length"].as_u64().unwrap() <= 2);

    let deps = ok(
        &server,
        "dependencies",
        json!({"id": "b.py", "direction": "in", "depth": 1}),
    );
    let node_ids: Vec<&str> = deps["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["id"].as_str())
        .collect();
    assert!(node_ids.contains(&"a.py"));

    let missing = call(&server, "find_path", json!({"from": "b.greet", "to": "a.py", "max_len": 2}));
    assert_eq!(missing.kind, FrameKind::Error);
    assert_eq!(missing.payload["code"], "not-found");
}

#[test]
fn unknown_tool_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "x = 1\n");
    let server = server_for(dir.path());
    let frame = call(&server, "frobnicate", json!({}));
    assert_eq!(frame.kind, FrameKind::Error);
    assert_eq!(frame.payload["code"], "invalid-input");
}

#[test]
fn incremental_update_invalidates_query_cache() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "b.py", "def greet():\n    pass\n");
    let server = server_for(dir.path());
    ok(&server, "scan", json!({}));

    let before = ok(&server, "query", json!({"predicate": {"type": "function"}}));
    assert_eq!(before["total_count"], 1);

    write(dir.path(), "b.py", "def greet():\n    pass\n\ndef bye():\n    pass\n");
    ok(&server, "update", json!({"reason": "added bye", "updated": ["b.py"]}));

    let after = ok(&server, "query", json!({"predicate": {"type": "function"}}));
    assert_eq!(after["total_count"], 2);
}
