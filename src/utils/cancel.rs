//! Cancellation utilities
//!
//! A session's cancellation predicate, shared between the orchestrator task
//! and the control surface that requests the stop.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct CancelState {
    flag: AtomicBool,
    notify: Notify,
}

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.state.flag.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.flag.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Create a standalone cancel handle that can be shared across tasks.
pub fn new_cancel_handle() -> CancelHandle {
    CancelHandle::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn clones_share_the_flag() {
        let handle = new_cancel_handle();
        let observer = handle.clone();
        assert!(!observer.is_cancelled());
        handle.cancel();
        handle.cancel();
        assert!(observer.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let handle = new_cancel_handle();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.cancelled().await })
        };
        tokio::task::yield_now().await;
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_set() {
        let handle = new_cancel_handle();
        handle.cancel();
        handle.cancelled().await;
    }
}
