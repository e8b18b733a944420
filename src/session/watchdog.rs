//! Bounded loading phase: force `loading = false` if bootstrap stalls.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::cleanup::Cleanup;
use super::store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// Loading ended on its own before the deadline.
    Settled,
    /// The deadline passed and the watchdog cleared loading.
    Forced,
    /// Teardown happened first.
    Cancelled,
}

/// Start the one-shot timer. Session and role are never touched.
pub fn spawn_watchdog(store: SessionStore, cleanup: Cleanup, timeout: Duration) -> JoinHandle<WatchdogOutcome> {
    tokio::spawn(async move {
        let mut states = store.subscribe();
        tokio::select! {
            biased;
            () = cleanup.signalled() => {
                debug!("watchdog cancelled by teardown");
                WatchdogOutcome::Cancelled
            }
            _ = states.wait_for(|s| !s.loading) => {
                debug!("bootstrap settled before watchdog deadline");
                WatchdogOutcome::Settled
            }
            () = tokio::time::sleep(timeout) => {
                if cleanup.is_signalled() {
                    return WatchdogOutcome::Cancelled;
                }
                if store.clear_loading() {
                    warn!(timeout_ms = timeout.as_millis(), "session bootstrap stalled; watchdog cleared loading");
                    WatchdogOutcome::Forced
                } else {
                    WatchdogOutcome::Settled
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "watchdog_test.rs"]
mod tests;
