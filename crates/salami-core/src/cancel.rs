//! Cancellation token shared between a fetch run and its caller.
//!
//! Workers poll [`CancellationToken::is_cancelled`] between steps and race
//! [`CancellationToken::cancelled`] against network reads and backoff sleeps,
//! so an in-flight download stops at its next await point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cloneable cancellation flag with async notification.
///
/// ```
/// use salami_core::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker = token.clone();
///
/// token.cancel();
/// assert!(worker.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            // Flag is re-checked after registering so a cancel between the two
            // cannot be missed.
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Return [`FetchError::Cancelled`](crate::FetchError::Cancelled) if cancelled.
    pub fn check(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(crate::FetchError::Cancelled)
        } else {
            Ok(())
        }
    }
}
