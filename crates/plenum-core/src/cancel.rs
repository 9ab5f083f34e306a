//! Cancellation token threaded through every kernel call.
//!
//! Coordination between organizer and members happens exclusively through
//! clone-and-push, so cancelling mid-tick is always safe: the local working
//! tree is discarded without pushing and the remote state is unchanged. Every
//! blocking repository or file operation checks the token first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{GovError, Result};

/// Shared cancellation flag.
///
/// Clones observe the same flag; [`CancelToken::cancel`] is visible to every
/// holder. Blocking operations call [`CancelToken::check`] before starting.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation to every holder of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`CancelToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`GovError::Cancelled`] once the token is cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(GovError::Cancelled);
        }
        Ok(())
    }
}
