//! Cooperative cancellation shared by every batch stage

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Batch-scoped cancellation flag
///
/// Cloning shares the flag. Stages poll [`CancelToken::is_cancelled`] at their
/// checkpoints and unwind on their own; nothing is interrupted abruptly.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
