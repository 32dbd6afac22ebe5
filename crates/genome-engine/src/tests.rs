//! Engine-level tests: idempotence and incremental correctness

use std::fs;
use std::path::Path;

use genome_core::{
    CancelToken, EdgeType, EngineConfig, FixedClock, NodeId, StaticHistory,
};

use crate::Engine;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn engine(root: &Path) -> Engine {
    let clock = FixedClock(chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc));
    Engine::with_capabilities(
        root,
        EngineConfig::default(),
        Box::new(StaticHistory::new()),
        Box::new(clock),
    )
    .unwrap()
}

#[test]
fn full_scan_builds_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "main.py",
        "def hello():\n    pass\n\nif __name__ == \"__main__\":\n    hello()\n",
    );
    let engine = engine(dir.path());
    let stats = engine.scan(false, &CancelToken::unbounded()).unwrap();
    assert_eq!(stats.generation, 1);
    assert!(stats.nodes >= 2);
    assert!(dir.path().join("repogenome.json").exists());

    let genome = engine.snapshot().unwrap();
    assert!(genome.nodes.contains_key(&NodeId::from("main.py")));
    assert!(genome.nodes.contains_key(&NodeId::from("main.hello")));
    assert!(genome
        .summary
        .entry_points
        .contains(&NodeId::from("main.py")));
}

#[test]
fn incremental_scan_with_no_changes_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "import b\nb.greet()\n");
    write(dir.path(), "b.py", "def greet():\n    pass\n");
    let engine = engine(dir.path());
    engine.scan(false, &CancelToken::unbounded()).unwrap();
    let first = engine.snapshot().unwrap();

    let stats = engine.scan(true, &CancelToken::unbounded()).unwrap();
    assert_eq!(stats.added + stats.modified + stats.removed, 0);
    let second = engine.snapshot().unwrap();
    assert!(first.content_eq(&second));
}

#[test]
fn incremental_modify_adds_exactly_the_new_symbol() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "import b\nb.greet()\n");
    write(dir.path(), "b.py", "def greet():\n    pass\n");
    let engine = engine(dir.path());
    engine.scan(false, &CancelToken::unbounded()).unwrap();
    let before = engine.snapshot().unwrap();

    write(dir.path(), "b.py", "def greet():\n    pass\n\ndef bye():\n    pass\n");
    let stats = engine.scan(true, &CancelToken::unbounded()).unwrap();
    assert_eq!(stats.modified, 1);
    let after = engine.snapshot().unwrap();

    assert!(after.nodes.contains_key(&NodeId::from("b.bye")));
    assert!(after.has_edge(&"b.py".into(), &"b.bye".into(), EdgeType::Defines));
    // Everything about a.py is untouched.
    assert_eq!(
        before.node(&"a.py".into()).unwrap().file,
        after.node(&"a.py".into()).unwrap().file
    );
    assert!(after.has_edge(&"a.py".into(), &"b.py".into(), EdgeType::Imports));
    assert!(after.has_edge(&"a.py".into(), &"b.greet".into(), EdgeType::Calls));
}

#[test]
fn incremental_matches_full_scan_after_change() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "import b\nb.greet()\n");
    write(dir.path(), "b.py", "def greet():\n    pass\n");
    let incremental_engine = engine(dir.path());
    incremental_engine.scan(false, &CancelToken::unbounded()).unwrap();

    write(dir.path(), "b.py", "def greet():\n    pass\n\ndef bye():\n    pass\n");
    write(dir.path(), "c.py", "import b\nb.bye()\n");
    incremental_engine.scan(true, &CancelToken::unbounded()).unwrap();
    let via_incremental = incremental_engine.snapshot().unwrap();

    let full_engine = engine(dir.path());
    full_engine.scan(false, &CancelToken::unbounded()).unwrap();
    let via_full = full_engine.snapshot().unwrap();

    assert!(via_incremental.content_eq(&via_full));
}

#[test]
fn removed_files_leave_no_trace() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "import b\nb.greet()\n");
    write(dir.path(), "b.py", "def greet():\n    pass\n");
    let engine = engine(dir.path());
    engine.scan(false, &CancelToken::unbounded()).unwrap();

    fs::remove_file(dir.path().join("b.py")).unwrap();
    let stats = engine.scan(true, &CancelToken::unbounded()).unwrap();
    assert_eq!(stats.removed, 1);

    let genome = engine.snapshot().unwrap();
    assert!(!genome.nodes.contains_key(&NodeId::from("b.py")));
    assert!(!genome.nodes.contains_key(&NodeId::from("b.greet")));
    // a.py's import now resolves to an external module.
    assert!(genome.has_edge(&"a.py".into(), &NodeId::external("b"), EdgeType::Imports));
}

#[test]
fn persisted_artifact_reloads() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "def f():\n    pass\n");
    let first = engine(dir.path());
    first.scan(false, &CancelToken::unbounded()).unwrap();
    let published = first.snapshot().unwrap();

    let second = engine(dir.path());
    assert!(second.load_persisted().unwrap());
    let loaded = second.snapshot().unwrap();
    assert!(loaded.content_eq(&published));
}

#[test]
fn validate_reports_clean_after_scan() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "def f():\n    pass\nf()\n");
    let engine = engine(dir.path());
    engine.scan(false, &CancelToken::unbounded()).unwrap();
    assert!(engine.validate().unwrap().is_empty());
}
