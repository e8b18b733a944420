//! Session lifecycle: state store, role resolution, reconciliation, watchdog
//! and credential operations.
//!
//! ARCHITECTURE
//! ============
//! `SessionManager` wires the pieces together for one process:
//!
//! - `store`: the single `SessionState` and its mutation point
//! - `reconciler`: probe + change stream → store, spawning role lookups
//! - `watchdog`: bounds the loading window
//! - `credentials`: sign-in / sign-out pass-throughs
//!
//! Readers either take a `snapshot()` or `subscribe()` to the watch
//! receiver and re-render on change.

pub mod cleanup;
pub mod credentials;
pub mod reconciler;
pub mod retry;
pub mod role;
pub mod store;
pub mod watchdog;

use std::sync::Arc;

use tokio::sync::watch;

pub use cleanup::Cleanup;
pub use credentials::{Credentials, normalize_email};
pub use reconciler::{ReconcileSource, SessionReconciler};
pub use role::{RoleLookup, RoleResolver};
pub use store::{SessionState, SessionStore};
pub use watchdog::WatchdogOutcome;

use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::identity::{IdentityProvider, RoleStore};

pub struct SessionManager {
    store: SessionStore,
    credentials: Credentials,
    reconciler: SessionReconciler,
}

impl SessionManager {
    /// Create the store and begin bootstrap. Must be called inside a tokio runtime.
    pub fn start(identity: Arc<dyn IdentityProvider>, roles: Arc<dyn RoleStore>, config: SessionConfig) -> Self {
        let store = SessionStore::new();
        let resolver = RoleResolver::new(roles, config.role_lookup);
        let reconciler = SessionReconciler::start(store.clone(), Arc::clone(&identity), resolver, &config);
        let credentials = Credentials::new(identity, store.clone());
        Self { store, credentials, reconciler }
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.store.snapshot()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.store.subscribe()
    }

    /// Resolves once the bootstrap window has closed (normally or forced).
    pub async fn wait_until_loaded(&self) -> SessionState {
        let mut states = self.store.subscribe();
        let state = match states.wait_for(|s| !s.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.store.snapshot(),
        };
        state
    }

    /// # Errors
    ///
    /// Returns the provider's error for display; session state is unchanged.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.credentials.sign_in(email, password).await
    }

    pub async fn sign_out(&self) {
        self.credentials.sign_out().await;
    }

    pub fn teardown(&self) {
        self.reconciler.teardown();
    }

    pub async fn watchdog_outcome(&mut self) -> Option<WatchdogOutcome> {
        self.reconciler.watchdog_outcome().await
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
