//! Identity and session value types shared by the collaborators and the store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

// =============================================================================
// PRINCIPAL + SESSION
// =============================================================================

/// The authenticated identity behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Credential bundle issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Expiry as unix seconds, when the provider reports one.
    pub expires_at: Option<i64>,
    pub principal: Principal,
}

impl Session {
    /// True when the access token expires within `margin_secs` of `now`.
    #[must_use]
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at.is_some_and(|at| at - margin_secs <= now)
    }
}

// =============================================================================
// ROLE
// =============================================================================

/// Authorization level of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Customer,
    Driver,
    Vendor,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Customer => "customer",
            Self::Driver => "driver",
            Self::Vendor => "vendor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "customer" => Ok(Self::Customer),
            "driver" => Ok(Self::Driver),
            "vendor" => Ok(Self::Vendor),
            _ => Err(AuthError::UnknownRole(raw.to_owned())),
        }
    }
}

// =============================================================================
// CHANGE NOTIFICATIONS
// =============================================================================

/// Why the identity provider emitted a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// One entry of the identity provider's change stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub change: SessionChange,
    pub session: Option<Session>,
}

impl SessionEvent {
    #[must_use]
    pub fn signed_in(session: Session) -> Self {
        Self { change: SessionChange::SignedIn, session: Some(session) }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { change: SessionChange::SignedOut, session: None }
    }

    #[must_use]
    pub fn token_refreshed(session: Session) -> Self {
        Self { change: SessionChange::TokenRefreshed, session: Some(session) }
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
