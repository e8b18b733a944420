//! Collaborator interfaces consumed by the session lifecycle manager.
//!
//! ARCHITECTURE
//! ============
//! The lifecycle manager only talks to two traits: `IdentityProvider`
//! (session probe, change stream, password sign-in, sign-out) and
//! `RoleStore` (role lookup by principal id). `gotrue` and `role_store`
//! implement them against the hosted backend over HTTP; tests use
//! in-process mocks.

pub mod gotrue;
pub mod role_store;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AuthError;
use crate::types::{Role, Session, SessionEvent};

pub use gotrue::GoTrueIdentity;
pub use role_store::PostgrestRoleStore;

const EVENT_CHANNEL_CAPACITY: usize = 32;

// =============================================================================
// TRAITS
// =============================================================================

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current session, if one exists (possibly restored from persisted storage).
    async fn current_session(&self) -> Result<Option<Session>, AuthError>;

    /// Register for future session-change events.
    fn on_session_change(&self) -> SessionSubscription;

    /// Exchange email + password for a session. Emits `SignedIn` on success.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    /// End the session remotely. Emits `SignedOut`.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    /// `Ok(None)` means the principal has no role record.
    async fn fetch_role(&self, principal_id: Uuid) -> Result<Option<Role>, AuthError>;
}

// =============================================================================
// CHANGE STREAM
// =============================================================================

/// Outcome of waiting on a subscription.
#[derive(Debug)]
pub enum Notification {
    Event(SessionEvent),
    /// The subscriber fell behind and `n` events were dropped.
    Lagged(u64),
    Closed,
}

/// Cancellable handle on the provider's change stream.
pub struct SessionSubscription {
    events: broadcast::Receiver<SessionEvent>,
}

impl SessionSubscription {
    pub async fn next(&mut self) -> Notification {
        match self.events.recv().await {
            Ok(event) => Notification::Event(event),
            Err(broadcast::error::RecvError::Lagged(n)) => Notification::Lagged(n),
            Err(broadcast::error::RecvError::Closed) => Notification::Closed,
        }
    }

    /// Stop receiving events. Consumes the handle.
    pub fn unsubscribe(self) {
        drop(self.events);
    }
}

/// Fan-out side of the change stream, owned by an identity provider.
#[derive(Clone)]
pub struct SessionBroadcaster {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription { events: self.tx.subscribe() }
    }

    /// Deliver to every live subscriber. Returns how many received it.
    pub fn emit(&self, event: SessionEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SessionBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
