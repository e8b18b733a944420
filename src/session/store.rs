//! Session state and its single serialized mutation point.
//!
//! DESIGN
//! ======
//! `SessionState` transitions are pure (`old state, input -> new state`).
//! `SessionStore` wraps the one process-wide instance in a `watch` channel:
//! every mutation goes through `send_if_modified`, which serializes writers,
//! and UI code subscribes to the receiver side for re-render.
//!
//! Each `apply_session` bumps a generation. Role results carry the
//! generation they were started under and are dropped if a newer session has
//! been applied since, so the last applicable event always wins and `role`
//! can never be set while `session` is null.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use super::cleanup::Cleanup;
use crate::types::{Principal, Role, Session};

pub type Generation = u64;

// =============================================================================
// SESSION STATE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub principal: Option<Principal>,
    pub session: Option<Session>,
    pub role: Option<Role>,
    pub loading: bool,
}

impl SessionState {
    /// Initial state at process start: nothing known yet, loading.
    #[must_use]
    pub fn bootstrapping() -> Self {
        Self { principal: None, session: None, role: None, loading: true }
    }

    /// Fully signed-out, non-loading state.
    #[must_use]
    pub fn signed_out() -> Self {
        Self { principal: None, session: None, role: None, loading: false }
    }

    /// Replace the session. `loading` is untouched. The role survives only
    /// when the principal is unchanged (token refresh).
    #[must_use]
    pub fn apply_session(self, session: Option<Session>) -> Self {
        let same_principal = match (&self.principal, &session) {
            (Some(current), Some(next)) => current.id == next.principal.id,
            _ => false,
        };
        Self {
            principal: session.as_ref().map(|s| s.principal.clone()),
            role: if same_principal { self.role } else { None },
            session,
            loading: self.loading,
        }
    }

    /// Record the resolved role and end the loading phase.
    #[must_use]
    pub fn set_role(self, role: Option<Role>) -> Self {
        let role = if self.session.is_some() { role } else { None };
        Self { role, loading: false, ..self }
    }

    #[must_use]
    pub fn clear_loading(self) -> Self {
        Self { loading: false, ..self }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::bootstrapping()
    }
}

// =============================================================================
// SESSION STORE
// =============================================================================

/// How a finished role resolution should touch the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleUpdate {
    /// Lookup answered (a role or no record).
    Set(Option<Role>),
    /// Lookup failed; keep whatever role is present.
    KeepPrevious,
}

/// Shared handle on the process-wide `SessionState`. Cheap to clone.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    tx: watch::Sender<SessionState>,
    // Only mutated inside `send_if_modified` closures, which the watch lock serializes.
    generation: AtomicU64,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(SessionState::bootstrapping())
    }

    #[must_use]
    pub fn with_state(state: SessionState) -> Self {
        let (tx, _) = watch::channel(state);
        Self { inner: Arc::new(StoreInner { tx, generation: AtomicU64::new(0) }) }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.inner.tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.tx.subscribe()
    }

    /// Push a newly observed session. Returns the generation role results
    /// for this session must present.
    pub fn apply_session(&self, session: Option<Session>) -> Generation {
        let mut generation = 0;
        self.inner.tx.send_if_modified(|state| {
            generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            replace_if_changed(state, |s| s.apply_session(session))
        });
        generation
    }

    /// Unconditional role write; ends loading.
    pub fn set_role(&self, role: Option<Role>) {
        self.inner
            .tx
            .send_if_modified(|state| replace_if_changed(state, |s| s.set_role(role)));
    }

    /// Apply a role result only if `generation` is still current and cleanup
    /// has not been signalled. Returns whether it was applied.
    pub fn settle_role(&self, generation: Generation, update: RoleUpdate, cleanup: &Cleanup) -> bool {
        let mut applied = false;
        self.inner.tx.send_if_modified(|state| {
            if cleanup.is_signalled() || !self.is_current(generation) {
                return false;
            }
            applied = true;
            match update {
                RoleUpdate::Set(role) => replace_if_changed(state, |s| s.set_role(role)),
                RoleUpdate::KeepPrevious => replace_if_changed(state, SessionState::clear_loading),
            }
        });
        applied
    }

    /// Force `loading = false` without touching session or role.
    /// Returns whether loading was still set.
    pub fn clear_loading(&self) -> bool {
        self.inner
            .tx
            .send_if_modified(|state| replace_if_changed(state, SessionState::clear_loading))
    }

    /// Return to the signed-out state. In-flight role results become stale.
    pub fn reset(&self) {
        self.inner.tx.send_if_modified(|state| {
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            replace_if_changed(state, |_| SessionState::signed_out())
        });
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn replace_if_changed<F>(state: &mut SessionState, transition: F) -> bool
where
    F: FnOnce(SessionState) -> SessionState,
{
    let next = transition(state.clone());
    if next == *state {
        return false;
    }
    *state = next;
    true
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
