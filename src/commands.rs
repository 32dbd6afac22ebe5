//! CLI command implementations

use std::path::Path;

use genome_core::export::ExportFormat;
use genome_core::{CancelToken, GenomeError, Result};
use genome_engine::Engine;
use genome_query::{Predicate, QueryOptions};
use genome_server::GenomeServer;

pub fn scan(root: &Path, incremental: bool) -> Result<()> {
    let engine = Engine::new(root)?;
    if incremental {
        engine.load_persisted()?;
    }
    let stats = engine.scan(incremental, &CancelToken::unbounded())?;
    tracing::info!(
        files = stats.files,
        nodes = stats.nodes,
        edges = stats.edges,
        incremental = stats.incremental,
        "scan complete"
    );
    if stats.partial {
        return Err(GenomeError::AnalysisError {
            diagnostics: Vec::new(),
        });
    }
    Ok(())
}

pub async fn serve(root: &Path) -> Result<()> {
    let engine = Engine::new(root)?;
    if engine.load_persisted()? {
        tracing::info!("loaded persisted genome");
    } else {
        tracing::info!("no persisted genome; clients should call scan first");
    }
    let server = GenomeServer::new(engine);
    server
        .serve_stdio()
        .await
        .map_err(|e| GenomeError::invalid_input(e.to_string()))
}

pub fn export(root: &Path, format: &str, out: Option<&Path>) -> Result<()> {
    let format = ExportFormat::parse(format)
        .ok_or_else(|| GenomeError::invalid_input(format!("unknown export format `{format}`")))?;
    let engine = Engine::new(root)?;
    if !engine.load_persisted()? {
        engine.scan(false, &CancelToken::unbounded())?;
    }
    let (path, bytes) = engine.export(format, out)?;
    tracing::info!(path = %path.display(), bytes, "export written");
    Ok(())
}

pub fn validate(root: &Path) -> Result<()> {
    let engine = Engine::new(root)?;
    if !engine.load_persisted()? {
        return Err(GenomeError::not_found("no persisted genome; run scan first"));
    }
    let violations = engine.validate()?;
    if violations.is_empty() {
        tracing::info!("genome is valid");
        return Ok(());
    }
    for violation in &violations {
        tracing::error!(
            invariant = %violation.invariant,
            id = %violation.id,
            "{}",
            violation.detail
        );
    }
    let first = &violations[0];
    Err(GenomeError::InvariantViolation {
        invariant: first.invariant.clone(),
        id: first.id.clone(),
    })
}

pub fn query(root: &Path, predicate: &str) -> Result<()> {
    let engine = Engine::new(root)?;
    if !engine.load_persisted()? {
        engine.scan(false, &CancelToken::unbounded())?;
    }
    let snapshot = engine
        .snapshot()
        .ok_or_else(|| GenomeError::not_found("no genome available"))?;

    let value: serde_json::Value = serde_json::from_str(predicate)
        .map_err(|e| GenomeError::invalid_input(format!("predicate is not JSON: {e}")))?;
    let parsed = Predicate::parse(&value)?;
    let page = genome_query::query(
        &snapshot,
        &parsed,
        &QueryOptions::default(),
        engine.config(),
    )?;
    let rendered = serde_json::to_string_pretty(&page)
        .map_err(|e| GenomeError::invalid_input(e.to_string()))?;
    println!("{rendered}");
    Ok(())
}
