//! Cooperative cancellation
//!
//! Every engine operation carries a token combining an explicit cancel flag
//! with a deadline. Parallel analysis checks it at chunk boundaries; I/O
//! paths check it before each read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{GenomeError, Result};

#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn unbounded() -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    pub fn with_deadline(timeout: Duration) -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Err(Cancelled) on explicit cancel, Err(Timeout) past the deadline.
    pub fn check(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(GenomeError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(GenomeError::Timeout);
            }
        }
        Ok(())
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_never_trips() {
        let token = CancelToken::unbounded();
        assert!(token.check().is_ok());
    }

    #[test]
    fn explicit_cancel() {
        let token = CancelToken::unbounded();
        token.cancel();
        assert!(matches!(token.check(), Err(GenomeError::Cancelled)));
    }

    #[test]
    fn elapsed_deadline() {
        let token = CancelToken::with_deadline(Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(token.check(), Err(GenomeError::Timeout)));
    }
}
