//! Role resolution for an authenticated principal.
//!
//! Fails soft: callers always get a value, never an error. "No record" and
//! "lookup failed" both read as `None` through `resolve_role`; the
//! reconciler uses `lookup` to tell them apart so a failed re-resolution
//! can keep the role already on screen.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::cleanup::Cleanup;
use super::retry::{RetryError, with_retry};
use crate::config::RetryPolicy;
use crate::identity::RoleStore;
use crate::types::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleLookup {
    Found(Role),
    /// The store answered with no matching record.
    Absent,
    /// Non-retryable error or retries exhausted.
    Failed,
    /// Cleanup was signalled mid-lookup.
    Cancelled,
}

impl RoleLookup {
    #[must_use]
    pub fn role(self) -> Option<Role> {
        match self {
            Self::Found(role) => Some(role),
            Self::Absent | Self::Failed | Self::Cancelled => None,
        }
    }
}

pub struct RoleResolver {
    store: Arc<dyn RoleStore>,
    policy: RetryPolicy,
}

impl RoleResolver {
    #[must_use]
    pub fn new(store: Arc<dyn RoleStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Resolve the principal's role, `None` when absent or on failure.
    pub async fn resolve_role(&self, principal_id: Uuid) -> Option<Role> {
        self.lookup(principal_id, &Cleanup::new()).await.role()
    }

    pub async fn lookup(&self, principal_id: Uuid, cleanup: &Cleanup) -> RoleLookup {
        let result = with_retry(self.policy, cleanup, "role_lookup", || self.store.fetch_role(principal_id)).await;
        match result {
            Ok(Some(role)) => {
                debug!(%principal_id, %role, "role resolved");
                RoleLookup::Found(role)
            }
            Ok(None) => {
                info!(%principal_id, "no role record for principal");
                RoleLookup::Absent
            }
            Err(RetryError::Failed(e)) => {
                info!(%principal_id, error = %e, "role lookup failed; treating role as unresolved");
                RoleLookup::Failed
            }
            Err(RetryError::Cancelled) => {
                debug!(%principal_id, "role lookup cancelled");
                RoleLookup::Cancelled
            }
        }
    }
}

#[cfg(test)]
#[path = "role_test.rs"]
mod tests;
