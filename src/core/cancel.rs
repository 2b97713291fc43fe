//! Cooperative cancellation for a migration run.
//!
//! The orchestrator checks the token before each file and between pre-scan
//! counts. It is never consulted while an LLM call or a lint/test command is
//! in flight, so a file that has started always finishes (or reverts).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set-once stop flag shared between the caller and the engine.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent; the flag is never cleared.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
