//! Sign-in and sign-out pass-throughs to the identity provider.
//!
//! ERROR HANDLING
//! ==============
//! Sign-in failures are returned to the caller for display and never touch
//! the store; the resulting `SignedIn` event reaches the store through the
//! reconciler's listener. Sign-out is local-state-wins: a remote failure is
//! logged and the store is reset regardless. Neither operation retries.

use std::sync::Arc;

use tracing::{info, warn};

use super::store::SessionStore;
use crate::error::AuthError;
use crate::identity::IdentityProvider;

pub struct Credentials {
    identity: Arc<dyn IdentityProvider>,
    store: SessionStore,
}

impl Credentials {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>, store: SessionStore) -> Self {
        Self { identity, store }
    }

    /// Exchange email and password for a session.
    ///
    /// # Errors
    ///
    /// `InvalidEmail` for a malformed address, otherwise whatever the
    /// identity provider reported (typically `InvalidCredentials`).
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let email = normalize_email(email).ok_or(AuthError::InvalidEmail)?;
        match self.identity.sign_in_with_password(&email, password).await {
            Ok(session) => {
                info!(principal_id = %session.principal.id, "signed in");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "sign-in failed");
                Err(e)
            }
        }
    }

    /// End the session remotely, then reset local state unconditionally.
    pub async fn sign_out(&self) {
        if let Err(e) = self.identity.sign_out().await {
            warn!(error = %e, "remote sign-out failed; clearing local session anyway");
        }
        self.store.reset();
        info!("signed out");
    }
}

/// Trim and lowercase; exactly one `@` with non-empty local and domain parts.
#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(normalized)
}

#[cfg(test)]
#[path = "credentials_test.rs"]
mod tests;
