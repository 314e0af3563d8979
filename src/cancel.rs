//! Cooperative cancellation for queued generation work.
//!
//! Cancellation is polled, not preemptive: the pipeline checks its token at
//! defined checkpoints and exits early when it was tripped. Once the store
//! step of a unit has begun, no further checkpoints are consulted.

use crate::error::{CacheError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag. Cloning yields a handle to the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a fresh, untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns whether the token has been tripped.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Checkpoint helper: `Err(Cancelled)` if the token has been tripped.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CacheError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.checkpoint(), Err(CacheError::Cancelled)));
    }

    #[test]
    fn fresh_token_passes_checkpoint() {
        assert!(CancellationToken::new().checkpoint().is_ok());
    }
}
