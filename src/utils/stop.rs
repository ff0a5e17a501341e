//! Cooperative cancellation primitive for session drivers.
//!
//! A `StopSignal` can be:
//! - Cloned and shared across tasks
//! - Awaited for cancellation notification
//! - Used in select! patterns to cancel futures at chunk boundaries

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A cooperative cancellation token.
///
/// Clones share the same underlying state, so cancelling any clone
/// notifies all waiters. Cancelling an already-cancelled signal is a no-op.
#[derive(Debug, Default)]
pub struct StopSignal {
    internal: Arc<SharedState>,
}

#[derive(Debug, Default)]
struct SharedState {
    closing: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    /// Create a new, uncancelled signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to all waiters.
    ///
    /// After this call, `cancelled()` returns `true` and all pending
    /// `wait()` futures complete.
    pub fn cancel(&self) {
        self.internal.closing.store(true, Ordering::Release);
        self.internal.notify.notify_waiters();
    }

    /// Check if cancellation has been signaled.
    pub fn cancelled(&self) -> bool {
        self.internal.closing.load(Ordering::Acquire)
    }

    /// Wait for cancellation to be signaled.
    ///
    /// Returns immediately if already cancelled.
    pub async fn wait(&self) {
        while !self.cancelled() {
            let mut notified = std::pin::pin!(self.internal.notify.notified());
            // Register with the notifier before re-checking the flag, so a
            // cancel between the check and the await cannot be missed.
            notified.as_mut().enable();
            if self.cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Clone for StopSignal {
    fn clone(&self) -> Self {
        Self {
            internal: Arc::clone(&self.internal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let stop = StopSignal::new();
        assert!(!stop.cancelled());

        let waiter = stop.clone();
        let handle = tokio::spawn(async move {
            waiter.wait().await;
            true
        });

        stop.cancel();
        assert!(stop.cancelled());
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_already_cancelled() {
        let stop = StopSignal::new();
        stop.cancel();
        stop.cancel(); // idempotent
        stop.wait().await;
    }
}
