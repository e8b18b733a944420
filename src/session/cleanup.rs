//! Monotonic teardown signal shared by every task of one reconciler.
//!
//! Set exactly once; checked after every suspension point before any store
//! mutation. Cooperative only: nothing is aborted, results are just dropped.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct Cleanup {
    tx: Arc<watch::Sender<bool>>,
}

impl Cleanup {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the flag. Idempotent; returns `true` only for the first call.
    pub fn signal(&self) -> bool {
        self.tx.send_if_modified(|signalled| {
            if *signalled {
                return false;
            }
            *signalled = true;
            true
        })
    }

    #[must_use]
    pub fn is_signalled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the flag is raised (immediately if it already is).
    pub async fn signalled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this never errors.
        let _ = rx.wait_for(|signalled| *signalled).await;
    }
}

impl Default for Cleanup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "cleanup_test.rs"]
mod tests;
