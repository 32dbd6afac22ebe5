//! Serving layer: framed stdio protocol, resources, tools, agent contract

pub mod protocol;
pub mod resources;
pub mod session;
pub mod tools;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use genome_core::{GenomeError, Result};
use genome_engine::Engine;
use genome_query::{ContextAssembler, ResultCache};

use protocol::Frame;
use session::SessionTable;

/// Shared state behind every request.
pub struct ServerContext {
    pub engine: Arc<Engine>,
    pub assembler: ContextAssembler,
    pub cache: ResultCache,
    pub sessions: SessionTable,
    validation_blocked: AtomicBool,
}

impl ServerContext {
    pub fn set_validation_blocked(&self, blocked: bool) {
        self.validation_blocked.store(blocked, Ordering::SeqCst);
    }

    pub fn validation_blocked(&self) -> bool {
        self.validation_blocked.load(Ordering::SeqCst)
    }
}

pub struct GenomeServer {
    ctx: ServerContext,
}

impl GenomeServer {
    pub fn new(engine: Engine) -> Self {
        let config = engine.config();
        let cache = ResultCache::new(
            config.cache_entries,
            std::time::Duration::from_secs(config.cache_ttl_secs),
        );
        GenomeServer {
            ctx: ServerContext {
                engine: Arc::new(engine),
                assembler: ContextAssembler::new(),
                cache,
                sessions: SessionTable::new(),
                validation_blocked: AtomicBool::new(false),
            },
        }
    }

    pub fn context(&self) -> &ServerContext {
        &self.ctx
    }

    /// Handle one request frame. Within a session, calls are serialized in
    /// request order by the single reader task.
    pub fn handle(&self, frame: Frame) -> Frame {
        let session_id = frame
            .payload
            .get("session_id")
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();
        let name = frame.name.clone();
        match self.handle_inner(&name, &frame.payload, &session_id) {
            Ok(payload) => Frame::response(frame.id, &name, payload),
            Err(error) => {
                tracing::debug!(tool = %name, code = error.code(), "request failed");
                Frame::error(frame.id, &name, &error)
            }
        }
    }

    fn handle_inner(&self, name: &str, payload: &Value, session_id: &str) -> Result<Value> {
        // Resources are URI-addressed read-only views.
        if let Some(uri) = name.strip_prefix("resource:") {
            let (value, counts_as_load) = resources::get(&self.ctx.engine, uri)?;
            if counts_as_load {
                self.ctx
                    .sessions
                    .mark_loaded(session_id, chrono::Utc::now());
            }
            return Ok(value);
        }

        let effect = tools::effect_of(name)
            .ok_or_else(|| GenomeError::invalid_input(format!("unknown tool `{name}`")))?;
        self.ctx
            .sessions
            .check(session_id, name, effect, self.ctx.validation_blocked())?;
        tools::dispatch(&self.ctx, name, payload, session_id)
    }

    /// Run the stdio transport: one reader task, requests handled in order,
    /// one JSON frame per line on stdout. Logs go to stderr only.
    pub async fn serve_stdio(self) -> anyhow::Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(stdin).lines();

        tracing::info!("serving genome over stdio");
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = match Frame::parse(&line) {
                Ok(frame) => self.handle(frame),
                Err(error) => Frame::error(Value::Null, "parse", &error),
            };
            let mut out = response.to_line();
            out.push('\n');
            stdout.write_all(out.as_bytes()).await?;
            stdout.flush().await?;
        }
        tracing::info!("stdin closed; shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
