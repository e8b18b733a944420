//! In-process collaborators and assertions shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::error::AuthError;
use crate::identity::{IdentityProvider, RoleStore, SessionBroadcaster, SessionSubscription};
use crate::types::{Principal, Role, Session, SessionEvent};

pub(crate) const GOOD_PASSWORD: &str = "correct horse";

pub(crate) fn session_for(id: Uuid) -> Session {
    Session {
        access_token: format!("access-{id}"),
        refresh_token: Some(format!("refresh-{id}")),
        expires_at: None,
        principal: Principal { id, email: Some(format!("{}@fleet.test", &id.to_string()[..8])) },
    }
}

/// Paused-clock timing check with a little slack for tick rounding.
pub(crate) fn assert_elapsed(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed <= expected + Duration::from_millis(10),
        "elapsed {elapsed:?}, expected ~{expected:?}"
    );
}

// =============================================================================
// MockRoleStore
// =============================================================================

pub(crate) enum RoleReply {
    Found(Role),
    NoRecord,
    /// Never answers; only the per-attempt timeout ends it.
    Hang,
    /// Transport-class failure (retryable).
    Transient,
    /// Permission failure (not retryable).
    Denied,
    After(Duration, Option<Role>),
    /// The store implementation itself blows up.
    Panic,
}

pub(crate) struct MockRoleStore {
    replies: Mutex<VecDeque<RoleReply>>,
    fallback: Option<Role>,
    calls: AtomicU32,
}

impl MockRoleStore {
    /// Answers with `replies` in order, then `fallback` forever.
    pub(crate) fn scripted(replies: Vec<RoleReply>, fallback: Option<Role>) -> Self {
        Self { replies: Mutex::new(replies.into()), fallback, calls: AtomicU32::new(0) }
    }

    pub(crate) fn always(role: Option<Role>) -> Self {
        Self::scripted(Vec::new(), role)
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RoleStore for MockRoleStore {
    async fn fetch_role(&self, _principal_id: Uuid) -> Result<Option<Role>, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            None => Ok(self.fallback),
            Some(RoleReply::Found(role)) => Ok(Some(role)),
            Some(RoleReply::NoRecord) => Ok(None),
            Some(RoleReply::Hang) => std::future::pending().await,
            Some(RoleReply::Transient) => Err(AuthError::Request("connection reset by peer".into())),
            Some(RoleReply::Denied) => Err(AuthError::Api { status: 403, body: "permission denied".into() }),
            Some(RoleReply::After(delay, role)) => {
                tokio::time::sleep(delay).await;
                Ok(role)
            }
            Some(RoleReply::Panic) => panic!("role store crashed"),
        }
    }
}

// =============================================================================
// MockIdentity
// =============================================================================

#[derive(Clone)]
pub(crate) enum Probe {
    Returns(Option<Session>),
    Hang,
    After(Duration, Option<Session>),
    Fails,
    Panics,
}

pub(crate) struct MockIdentity {
    probe: Probe,
    pub(crate) events: SessionBroadcaster,
    sign_in_principal: Uuid,
    sign_out_fails: bool,
    probe_calls: AtomicU32,
    sign_out_calls: AtomicU32,
}

impl MockIdentity {
    pub(crate) fn new(probe: Probe) -> Self {
        Self {
            probe,
            events: SessionBroadcaster::new(),
            sign_in_principal: Uuid::new_v4(),
            sign_out_fails: false,
            probe_calls: AtomicU32::new(0),
            sign_out_calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn failing_sign_out(mut self) -> Self {
        self.sign_out_fails = true;
        self
    }

    pub(crate) fn sign_in_principal(&self) -> Uuid {
        self.sign_in_principal
    }

    pub(crate) fn emit(&self, event: SessionEvent) -> usize {
        self.events.emit(event)
    }

    pub(crate) fn probe_calls(&self) -> u32 {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sign_out_calls(&self) -> u32 {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IdentityProvider for MockIdentity {
    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        match self.probe.clone() {
            Probe::Returns(session) => Ok(session),
            Probe::Hang => std::future::pending().await,
            Probe::After(delay, session) => {
                tokio::time::sleep(delay).await;
                Ok(session)
            }
            Probe::Fails => Err(AuthError::Api { status: 500, body: "upstream".into() }),
            Probe::Panics => panic!("identity provider crashed"),
        }
    }

    fn on_session_change(&self) -> SessionSubscription {
        self.events.subscribe()
    }

    async fn sign_in_with_password(&self, _email: &str, password: &str) -> Result<Session, AuthError> {
        if password != GOOD_PASSWORD {
            return Err(AuthError::InvalidCredentials { message: "Invalid login credentials".into() });
        }
        let session = session_for(self.sign_in_principal);
        self.events.emit(SessionEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.events.emit(SessionEvent::signed_out());
        if self.sign_out_fails {
            return Err(AuthError::Request("network unreachable".into()));
        }
        Ok(())
    }
}
