//! Merges the initial session probe and the change stream into the store.
//!
//! ARCHITECTURE
//! ============
//! `start` subscribes to the identity provider's change stream first, then
//! spawns three tasks that race: the initial probe, the listener loop, and
//! the watchdog. Probe results and change events both funnel into
//! `reconcile`, which pushes the session into the store and, for a signed-in
//! principal, spawns a role resolution.
//!
//! CONCURRENCY
//! ===========
//! There is no ordering between the probe and the first change event; the
//! store converges on whichever was applied last. Role results are tagged
//! with the store generation they were started under and dropped if stale.
//! Teardown raises the shared `Cleanup` flag; every task checks it after
//! each suspension point and the store re-checks it under its lock.
//!
//! ERROR HANDLING
//! ==============
//! Nothing here returns an error. A failed probe reconciles a null session.
//! Every spawned task runs under a supervisor: a panicking probe or listener
//! resets the store to signed-out, a panicking role resolution settles its
//! generation keeping the previous role. Either way loading ends without
//! waiting on the watchdog.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::cleanup::Cleanup;
use super::retry::{RetryError, with_retry};
use super::role::{RoleLookup, RoleResolver};
use super::store::{RoleUpdate, SessionStore};
use super::watchdog::{WatchdogOutcome, spawn_watchdog};
use crate::config::{RetryPolicy, SessionConfig};
use crate::identity::{IdentityProvider, Notification, SessionSubscription};
use crate::types::{Session, SessionChange};

/// Where a reconciled session value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileSource {
    InitialProbe,
    Listener(SessionChange),
    /// Re-probe after the change stream dropped events.
    Resync,
}

struct Shared {
    store: SessionStore,
    identity: Arc<dyn IdentityProvider>,
    resolver: RoleResolver,
    cleanup: Cleanup,
    probe_policy: RetryPolicy,
}

pub struct SessionReconciler {
    shared: Arc<Shared>,
    watchdog: Option<JoinHandle<WatchdogOutcome>>,
}

impl SessionReconciler {
    /// Begin bootstrap. Must be called inside a tokio runtime.
    pub fn start(
        store: SessionStore,
        identity: Arc<dyn IdentityProvider>,
        resolver: RoleResolver,
        config: &SessionConfig,
    ) -> Self {
        let cleanup = Cleanup::new();
        // Subscribe before probing so nothing emitted in between is lost.
        let subscription = identity.on_session_change();
        let shared = Arc::new(Shared { store, identity, resolver, cleanup, probe_policy: config.probe });

        let watchdog = spawn_watchdog(shared.store.clone(), shared.cleanup.clone(), config.watchdog);
        supervise(&shared, "session_listener", listen(shared.clone(), subscription), reset_on_panic);
        supervise(
            &shared,
            "session_probe",
            probe(shared.clone(), ReconcileSource::InitialProbe),
            reset_on_panic,
        );

        info!(watchdog_ms = config.watchdog.as_millis(), "session bootstrap started");
        Self { shared, watchdog: Some(watchdog) }
    }

    /// Apply a newly observed session value.
    pub fn reconcile(&self, session: Option<Session>, source: ReconcileSource) {
        reconcile(&self.shared, session, source);
    }

    /// Cancel the subscription and drop every in-flight result. Idempotent.
    pub fn teardown(&self) {
        if self.shared.cleanup.signal() {
            info!("session reconciler torn down");
        }
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.shared.cleanup.is_signalled()
    }

    /// Wait for the watchdog to finish. `None` if already awaited.
    pub async fn watchdog_outcome(&mut self) -> Option<WatchdogOutcome> {
        let handle = self.watchdog.take()?;
        handle.await.ok()
    }
}

impl Drop for SessionReconciler {
    fn drop(&mut self) {
        self.teardown();
    }
}

// =============================================================================
// RECONCILE
// =============================================================================

fn reconcile(shared: &Arc<Shared>, session: Option<Session>, source: ReconcileSource) {
    if shared.cleanup.is_signalled() {
        debug!(?source, "ignoring session after teardown");
        return;
    }

    let principal_id = session.as_ref().map(|s| s.principal.id);
    // PHASE: PUSH SESSION
    // WHY: the session lands before any role work so readers see it first.
    let generation = shared.store.apply_session(session);
    debug!(?source, generation, signed_in = principal_id.is_some(), "session reconciled");

    let Some(principal_id) = principal_id else {
        shared
            .store
            .settle_role(generation, RoleUpdate::Set(None), &shared.cleanup);
        return;
    };

    // PHASE: RESOLVE ROLE
    let task_shared = Arc::clone(shared);
    let resolve = async move {
        let shared = task_shared;
        let update = match shared.resolver.lookup(principal_id, &shared.cleanup).await {
            RoleLookup::Found(role) => RoleUpdate::Set(Some(role)),
            RoleLookup::Absent => RoleUpdate::Set(None),
            RoleLookup::Failed => RoleUpdate::KeepPrevious,
            RoleLookup::Cancelled => return,
        };
        if !shared.store.settle_role(generation, update, &shared.cleanup) {
            debug!(%principal_id, generation, "dropping stale role result");
        }
    };
    supervise(shared, "role_resolution", resolve, move |shared: &Shared| {
        shared
            .store
            .settle_role(generation, RoleUpdate::KeepPrevious, &shared.cleanup);
    });
}

// =============================================================================
// TASKS
// =============================================================================

async fn probe(shared: Arc<Shared>, source: ReconcileSource) {
    let identity = Arc::clone(&shared.identity);
    let result = with_retry(shared.probe_policy, &shared.cleanup, "session_probe", || {
        identity.current_session()
    })
    .await;

    let session = match result {
        Ok(session) => session,
        Err(RetryError::Cancelled) => return,
        Err(RetryError::Failed(e)) => {
            warn!(?source, error = %e, "session probe failed; continuing signed out");
            None
        }
    };
    reconcile(&shared, session, source);
}

async fn listen(shared: Arc<Shared>, mut subscription: SessionSubscription) {
    loop {
        let notification = tokio::select! {
            biased;
            () = shared.cleanup.signalled() => break,
            notification = subscription.next() => notification,
        };
        match notification {
            Notification::Event(event) => {
                debug!(change = ?event.change, "session change received");
                reconcile(&shared, event.session, ReconcileSource::Listener(event.change));
            }
            Notification::Lagged(missed) => {
                warn!(missed, "session change stream lagged; re-probing");
                supervise(
                    &shared,
                    "session_resync",
                    probe(shared.clone(), ReconcileSource::Resync),
                    reset_on_panic,
                );
            }
            Notification::Closed => {
                debug!("session change stream closed");
                break;
            }
        }
    }
    subscription.unsubscribe();
}

/// Run `task`; if it panics, log and hand the shared state to `on_panic`.
fn supervise<F, P>(shared: &Arc<Shared>, name: &'static str, task: F, on_panic: P)
where
    F: Future<Output = ()> + Send + 'static,
    P: FnOnce(&Shared) + Send + 'static,
{
    let inner = tokio::spawn(task);
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let Err(e) = inner.await else {
            return;
        };
        if !e.is_panic() {
            return;
        }
        error!(task = name, "session task panicked");
        if !shared.cleanup.is_signalled() {
            on_panic(&*shared);
        }
    });
}

fn reset_on_panic(shared: &Shared) {
    warn!("resetting session to signed out after task panic");
    shared.store.reset();
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod tests;
