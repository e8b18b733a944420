//! fleetdesk: session lifecycle core for the fleet admin console.
//!
//! ARCHITECTURE
//! ============
//! - `session`: the lifecycle manager (state store, reconciler, role
//!   resolver, watchdog, credential operations)
//! - `identity`: collaborator traits plus HTTP implementations against the
//!   hosted auth and data APIs
//! - `storage` / `prefs`: JSON state file for the persisted credential and
//!   UI preferences
//! - `config` / `error` / `types`: shared plumbing

pub mod config;
pub mod error;
pub mod identity;
pub mod prefs;
pub mod session;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
