//! Session state and the agent contract
//!
//! Per-session record of what the client has loaded, assessed, and owes.
//! The contract is enforced before dispatch; violations are never silently
//! recovered.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

use genome_core::{GenomeError, Result};

/// Tool effect classes, as declared in the tool table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolEffect {
    /// Pure read of the current snapshot.
    Reader,
    /// Mutates the genome or server state.
    Writer,
    /// Reader that additionally records onto the session (impact).
    ImpactRecord,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub loaded_at: Option<DateTime<Utc>>,
    pub last_impact: Option<Value>,
    /// Set once the client reports an edit-effecting impact; cleared by a
    /// successful `update` or `validate`.
    pub pending_update: bool,
}

pub struct SessionTable {
    sessions: DashMap<String, SessionState>,
}

impl SessionTable {
    pub fn new() -> Self {
        SessionTable {
            sessions: DashMap::new(),
        }
    }

    pub fn mark_loaded(&self, session_id: &str, at: DateTime<Utc>) {
        self.sessions.entry(session_id.to_string()).or_default().loaded_at = Some(at);
    }

    pub fn record_impact(&self, session_id: &str, impact: Value, edit_effecting: bool) {
        let mut session = self.sessions.entry(session_id.to_string()).or_default();
        session.last_impact = Some(impact);
        if edit_effecting {
            session.pending_update = true;
        }
    }

    pub fn clear_pending(&self, session_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.pending_update = false;
        }
    }

    pub fn state(&self, session_id: &str) -> SessionState {
        self.sessions
            .get(session_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Enforce the agent contract for one tool call.
    ///
    /// - `validation_blocked`: a failed `validate` blocks everything except
    ///   `scan` and `validate` until resolved.
    /// - load-before-mutate: writers (other than the bootstrapping `scan`)
    ///   require a prior `current`/`summary` load or scan in this session.
    /// - update-after-edit: a recorded edit-effecting impact blocks query
    ///   tools until `update` or a clean `validate`.
    pub fn check(
        &self,
        session_id: &str,
        tool: &str,
        effect: ToolEffect,
        validation_blocked: bool,
    ) -> Result<()> {
        if validation_blocked && tool != "scan" && tool != "validate" {
            return Err(GenomeError::contract(
                "validation-blocked",
                "genome failed validation; only scan and validate are permitted",
            ));
        }
        let state = self.state(session_id);
        if effect == ToolEffect::Writer && tool != "scan" && state.loaded_at.is_none() {
            return Err(GenomeError::contract(
                "missing-load",
                "load the `current` resource (or run scan) before mutating state",
            ));
        }
        if state.pending_update
            && effect == ToolEffect::Reader
            && !matches!(tool, "validate" | "export")
        {
            return Err(GenomeError::contract(
                "missing-update",
                "edits were reported via impact; call `update` before further queries",
            ));
        }
        Ok(())
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}
