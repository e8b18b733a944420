//! Persisted UI preferences (sidebar open/closed).
//!
//! Read once at mount, written back on every toggle. Persistence is
//! best-effort: a failed write is logged and the in-memory value still flips.

use std::sync::Arc;

use tracing::warn;

use crate::storage::JsonFileStore;

const SIDEBAR_KEY: &str = "ui.sidebar_open";

pub struct Preferences {
    store: Arc<JsonFileStore>,
    sidebar_open: bool,
}

impl Preferences {
    /// Load stored preferences, defaulting the sidebar to open.
    pub async fn load(store: Arc<JsonFileStore>) -> Self {
        let sidebar_open = match store.load::<bool>(SIDEBAR_KEY).await {
            Ok(value) => value.unwrap_or(true),
            Err(e) => {
                warn!(error = %e, "failed to read sidebar preference");
                true
            }
        };
        Self { store, sidebar_open }
    }

    #[must_use]
    pub fn sidebar_open(&self) -> bool {
        self.sidebar_open
    }

    /// Flip the sidebar flag and persist it. Returns the new value.
    pub async fn toggle_sidebar(&mut self) -> bool {
        self.sidebar_open = !self.sidebar_open;
        if let Err(e) = self.store.save(SIDEBAR_KEY, &self.sidebar_open).await {
            warn!(error = %e, "failed to persist sidebar preference");
        }
        self.sidebar_open
    }
}

#[cfg(test)]
#[path = "prefs_test.rs"]
mod tests;
