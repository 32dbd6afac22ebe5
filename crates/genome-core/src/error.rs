//! Engine error taxonomy

use thiserror::Error;

/// Severity of a per-file analyzer diagnostic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A non-fatal problem reported by an analyzer. Diagnostics never abort a
/// scan; error-severity ones mark the genome as partial.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Diagnostic {
    pub file: String,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(file: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            file: file.into(),
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(file: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            file: file.into(),
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GenomeError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("stale genome: {message}")]
    Stale { message: String },

    #[error("contract violation ({code}): {message}")]
    ContractViolation { code: String, message: String },

    #[error("analysis failed for {} file(s)", diagnostics.len())]
    AnalysisError { diagnostics: Vec<Diagnostic> },

    #[error("invariant {invariant} violated by {id}")]
    InvariantViolation { invariant: String, id: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("deadline elapsed")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}

impl GenomeError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        GenomeError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        GenomeError::NotFound { what: what.into() }
    }

    pub fn contract(code: impl Into<String>, message: impl Into<String>) -> Self {
        GenomeError::ContractViolation {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code surfaced on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            GenomeError::InvalidInput { .. } => "invalid-input",
            GenomeError::NotFound { .. } => "not-found",
            GenomeError::Stale { .. } => "stale",
            GenomeError::ContractViolation { .. } => "contract-violation",
            GenomeError::AnalysisError { .. } => "analysis-error",
            GenomeError::InvariantViolation { .. } => "invariant-violation",
            GenomeError::Io(_) => "io-error",
            GenomeError::Timeout => "timeout",
            GenomeError::Cancelled => "cancelled",
        }
    }

    /// Concrete recovery step for the client, when one exists.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            GenomeError::Stale { .. } => Some("run `scan` to rebuild the genome"),
            GenomeError::ContractViolation { .. } => {
                Some("load the `current` resource, then report edits via `update`")
            }
            GenomeError::InvariantViolation { .. } => {
                Some("run `scan incremental=false` to rebuild from scratch")
            }
            GenomeError::AnalysisError { .. } => {
                Some("inspect diagnostics; the genome was produced with partial coverage")
            }
            GenomeError::Timeout => Some("retry with a longer deadline or a narrower scope"),
            _ => None,
        }
    }

    /// Exit code for the thin CLI driver.
    pub fn exit_code(&self) -> i32 {
        match self {
            GenomeError::InvalidInput { .. } | GenomeError::NotFound { .. } => 2,
            GenomeError::InvariantViolation { .. } | GenomeError::Stale { .. } => 3,
            GenomeError::AnalysisError { .. } => 4,
            GenomeError::Io(_) | GenomeError::Timeout | GenomeError::Cancelled => 5,
            GenomeError::ContractViolation { .. } => 64,
        }
    }
}

pub type Result<T> = std::result::Result<T, GenomeError>;
