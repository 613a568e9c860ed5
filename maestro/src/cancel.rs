//! Cooperative cancellation.
//!
//! One [`CancelToken`] is shared from the caller through every subsystem.
//! Each suspension point checks it: no new model call or tool call starts
//! after cancellation, and in-flight streams abort at the next chunk.
//! Per-agent deadlines compose with the caller's token by logical OR via
//! [`CancelToken::merged`].

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// A cooperative cancellation handle.
///
/// Cloning is cheap; all clones observe the same signal. Tokens created by
/// [`merged`](Self::merged) fire when either parent fires.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    /// Create a fresh, untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Check whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Error out early when cancellation has been requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve when cancellation is requested.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }

    /// Combine two tokens: the result fires when either input fires.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let merged = CancellationToken::new();
        let out = merged.clone();
        let a = self.inner.clone();
        let b = other.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = a.cancelled() => {}
                () = b.cancelled() => {}
            }
            merged.cancel();
        });
        Self { inner: out }
    }

    /// A token that fires after `deadline` elapses.
    #[must_use]
    pub fn deadline(deadline: Duration) -> Self {
        let token = CancellationToken::new();
        let out = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            token.cancel();
        });
        Self { inner: out }
    }
}
