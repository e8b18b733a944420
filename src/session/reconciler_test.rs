use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use super::*;
use crate::session::store::SessionState;
use crate::test_helpers::{self, MockIdentity, MockRoleStore, Probe, RoleReply, assert_elapsed};
use crate::types::{Role, SessionEvent};

fn start(identity: &Arc<MockIdentity>, roles: &Arc<MockRoleStore>) -> (SessionStore, SessionReconciler) {
    let store = SessionStore::new();
    let config = SessionConfig::default();
    let resolver = RoleResolver::new(roles.clone(), config.role_lookup);
    let reconciler = SessionReconciler::start(store.clone(), identity.clone(), resolver, &config);
    (store, reconciler)
}

async fn wait_loaded(store: &SessionStore) -> SessionState {
    let mut states = store.subscribe();
    let state = states.wait_for(|s| !s.loading).await.unwrap().clone();
    state
}

// =============================================================================
// BOOTSTRAP
// =============================================================================

#[tokio::test(start_paused = true)]
async fn no_session_settles_signed_out() {
    let identity = Arc::new(MockIdentity::new(Probe::Returns(None)));
    let roles = Arc::new(MockRoleStore::always(Some(Role::Admin)));
    let (store, mut reconciler) = start(&identity, &roles);

    assert_eq!(wait_loaded(&store).await, SessionState::signed_out());
    assert_eq!(reconciler.watchdog_outcome().await, Some(WatchdogOutcome::Settled));
    assert_eq!(roles.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_role_lookup_settles_before_watchdog() {
    let session = test_helpers::session_for(Uuid::new_v4());
    let identity = Arc::new(MockIdentity::new(Probe::Returns(Some(session.clone()))));
    let roles = Arc::new(MockRoleStore::scripted(vec![RoleReply::Hang], Some(Role::Admin)));
    let start_at = Instant::now();
    let (store, mut reconciler) = start(&identity, &roles);

    let state = wait_loaded(&store).await;

    assert_elapsed(start_at, Duration::from_millis(3000 + 1000));
    assert_eq!(state.session, Some(session));
    assert_eq!(state.role, Some(Role::Admin));
    assert!(state.is_admin());
    assert_eq!(reconciler.watchdog_outcome().await, Some(WatchdogOutcome::Settled));
}

#[tokio::test(start_paused = true)]
async fn hung_probe_is_released_by_watchdog() {
    let identity = Arc::new(MockIdentity::new(Probe::Hang));
    let roles = Arc::new(MockRoleStore::always(Some(Role::Admin)));
    let start_at = Instant::now();
    let (store, mut reconciler) = start(&identity, &roles);

    assert_eq!(reconciler.watchdog_outcome().await, Some(WatchdogOutcome::Forced));
    assert_elapsed(start_at, Duration::from_millis(5000));

    let state = store.snapshot();
    assert!(!state.loading);
    assert!(state.session.is_none());
    assert!(state.role.is_none());
}

#[tokio::test(start_paused = true)]
async fn failing_probe_retries_then_continues_signed_out() {
    let identity = Arc::new(MockIdentity::new(Probe::Fails));
    let roles = Arc::new(MockRoleStore::always(Some(Role::Admin)));
    let start_at = Instant::now();
    let (store, _reconciler) = start(&identity, &roles);

    assert_eq!(wait_loaded(&store).await, SessionState::signed_out());
    assert_eq!(identity.probe_calls(), 3);
    assert_elapsed(start_at, Duration::from_millis(2 * 1000));
}

#[tokio::test(start_paused = true)]
async fn watchdog_leaves_late_role_to_land() {
    let session = test_helpers::session_for(Uuid::new_v4());
    let identity = Arc::new(MockIdentity::new(Probe::Returns(Some(session))));
    let roles = Arc::new(MockRoleStore::scripted(vec![RoleReply::Hang, RoleReply::Hang], Some(Role::Vendor)));
    let (store, mut reconciler) = start(&identity, &roles);

    assert_eq!(reconciler.watchdog_outcome().await, Some(WatchdogOutcome::Forced));
    assert!(store.snapshot().role.is_none());

    // Third attempt starts at 8000ms and answers immediately.
    tokio::time::sleep(Duration::from_millis(4000)).await;
    assert_eq!(store.snapshot().role, Some(Role::Vendor));
}

// =============================================================================
// CHANGE STREAM
// =============================================================================

#[tokio::test(start_paused = true)]
async fn last_event_wins_and_stale_role_is_dropped() {
    let first = test_helpers::session_for(Uuid::new_v4());
    let second = test_helpers::session_for(Uuid::new_v4());
    let identity = Arc::new(MockIdentity::new(Probe::Returns(Some(first))));
    let roles = Arc::new(MockRoleStore::scripted(
        vec![RoleReply::Found(Role::Admin), RoleReply::After(Duration::from_millis(500), Some(Role::Driver))],
        None,
    ));
    let (store, _reconciler) = start(&identity, &roles);
    assert_eq!(wait_loaded(&store).await.role, Some(Role::Admin));

    identity.emit(SessionEvent::signed_in(second));
    identity.emit(SessionEvent::signed_out());
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(roles.calls(), 2);
    assert_eq!(store.snapshot(), SessionState::signed_out());
}

#[tokio::test(start_paused = true)]
async fn principal_switch_clears_role_until_resolved() {
    let first = test_helpers::session_for(Uuid::new_v4());
    let second = test_helpers::session_for(Uuid::new_v4());
    let identity = Arc::new(MockIdentity::new(Probe::Returns(Some(first))));
    let roles = Arc::new(MockRoleStore::scripted(
        vec![RoleReply::Found(Role::Admin), RoleReply::After(Duration::from_millis(500), Some(Role::Customer))],
        None,
    ));
    let (store, _reconciler) = start(&identity, &roles);
    wait_loaded(&store).await;

    identity.emit(SessionEvent::signed_in(second.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    let state = store.snapshot();
    assert_eq!(state.session, Some(second.clone()));
    assert!(state.role.is_none());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.snapshot().role, Some(Role::Customer));
}

#[tokio::test(start_paused = true)]
async fn token_refresh_keeps_role_when_lookup_fails() {
    let session = test_helpers::session_for(Uuid::new_v4());
    let identity = Arc::new(MockIdentity::new(Probe::Returns(Some(session.clone()))));
    let roles = Arc::new(MockRoleStore::scripted(vec![RoleReply::Found(Role::Vendor), RoleReply::Denied], None));
    let (store, _reconciler) = start(&identity, &roles);
    assert_eq!(wait_loaded(&store).await.role, Some(Role::Vendor));

    let refreshed = Session { access_token: "rotated".into(), ..session };
    identity.emit(SessionEvent::token_refreshed(refreshed.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let state = store.snapshot();
    assert_eq!(roles.calls(), 2);
    assert_eq!(state.session, Some(refreshed));
    assert_eq!(state.role, Some(Role::Vendor));
}

#[tokio::test(start_paused = true)]
async fn lagged_stream_triggers_resync_probe() {
    let session = test_helpers::session_for(Uuid::new_v4());
    let identity = Arc::new(MockIdentity::new(Probe::Returns(Some(session.clone()))));
    let roles = Arc::new(MockRoleStore::always(Some(Role::Admin)));
    let (store, _reconciler) = start(&identity, &roles);

    // Overflow the channel before the listener gets to run.
    for _ in 0..40 {
        identity.emit(SessionEvent::signed_out());
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(identity.probe_calls(), 2);
    let state = store.snapshot();
    assert_eq!(state.session, Some(session));
    assert_eq!(state.role, Some(Role::Admin));
}

// =============================================================================
// TASK PANICS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn panicking_probe_resets_to_signed_out() {
    let identity = Arc::new(MockIdentity::new(Probe::Panics));
    let roles = Arc::new(MockRoleStore::always(Some(Role::Admin)));
    let start_at = Instant::now();
    let (store, mut reconciler) = start(&identity, &roles);

    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(store.snapshot(), SessionState::signed_out());
    assert_eq!(reconciler.watchdog_outcome().await, Some(WatchdogOutcome::Settled));
    assert!(start_at.elapsed() < Duration::from_millis(5000));
}

#[tokio::test(start_paused = true)]
async fn panicking_role_store_ends_loading_without_watchdog() {
    let session = test_helpers::session_for(Uuid::new_v4());
    let identity = Arc::new(MockIdentity::new(Probe::Returns(Some(session.clone()))));
    let roles = Arc::new(MockRoleStore::scripted(vec![RoleReply::Panic], Some(Role::Admin)));
    let start_at = Instant::now();
    let (store, mut reconciler) = start(&identity, &roles);

    tokio::time::sleep(Duration::from_millis(1)).await;

    let state = store.snapshot();
    assert!(!state.loading);
    assert_eq!(state.session, Some(session));
    assert!(state.role.is_none());
    assert_eq!(reconciler.watchdog_outcome().await, Some(WatchdogOutcome::Settled));
    assert!(start_at.elapsed() < Duration::from_millis(5000));
}

#[tokio::test(start_paused = true)]
async fn panicking_role_refresh_keeps_previous_role() {
    let session = test_helpers::session_for(Uuid::new_v4());
    let identity = Arc::new(MockIdentity::new(Probe::Returns(Some(session.clone()))));
    let roles = Arc::new(MockRoleStore::scripted(vec![RoleReply::Found(Role::Driver), RoleReply::Panic], None));
    let (store, _reconciler) = start(&identity, &roles);
    assert_eq!(wait_loaded(&store).await.role, Some(Role::Driver));

    let refreshed = Session { access_token: "rotated".into(), ..session };
    identity.emit(SessionEvent::token_refreshed(refreshed.clone()));
    tokio::time::sleep(Duration::from_millis(1)).await;

    let state = store.snapshot();
    assert_eq!(roles.calls(), 2);
    assert_eq!(state.session, Some(refreshed));
    assert_eq!(state.role, Some(Role::Driver));
}

// =============================================================================
// TEARDOWN
// =============================================================================

#[tokio::test(start_paused = true)]
async fn teardown_drops_in_flight_role() {
    let session = test_helpers::session_for(Uuid::new_v4());
    let identity = Arc::new(MockIdentity::new(Probe::Returns(Some(session.clone()))));
    let roles = Arc::new(MockRoleStore::scripted(
        vec![RoleReply::After(Duration::from_millis(2000), Some(Role::Admin))],
        None,
    ));
    let (store, mut reconciler) = start(&identity, &roles);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.snapshot().session, Some(session));

    reconciler.teardown();
    reconciler.teardown();
    assert!(reconciler.is_torn_down());
    assert_eq!(reconciler.watchdog_outcome().await, Some(WatchdogOutcome::Cancelled));

    tokio::time::sleep(Duration::from_secs(10)).await;
    let state = store.snapshot();
    assert!(state.role.is_none());
    assert!(state.loading);
}

#[tokio::test(start_paused = true)]
async fn events_after_teardown_are_ignored() {
    let identity = Arc::new(MockIdentity::new(Probe::Returns(None)));
    let roles = Arc::new(MockRoleStore::always(Some(Role::Admin)));
    let (store, reconciler) = start(&identity, &roles);
    wait_loaded(&store).await;

    reconciler.teardown();
    tokio::time::sleep(Duration::from_millis(10)).await;
    identity.emit(SessionEvent::signed_in(test_helpers::session_for(Uuid::new_v4())));
    reconciler.reconcile(Some(test_helpers::session_for(Uuid::new_v4())), ReconcileSource::Resync);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(store.snapshot(), SessionState::signed_out());
    assert_eq!(roles.calls(), 0);
    assert_eq!(identity.events.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_reconciler_tears_down() {
    let identity = Arc::new(MockIdentity::new(Probe::Hang));
    let roles = Arc::new(MockRoleStore::always(None));
    let (store, reconciler) = start(&identity, &roles);

    drop(reconciler);
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert!(store.snapshot().loading);
}
