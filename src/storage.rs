//! JSON key-value file used for the persisted credential and UI preferences.
//!
//! SYSTEM CONTEXT
//! ==============
//! Plays the role browser `localStorage` plays for the admin console: a
//! small map of string keys to JSON values. Writes go through a temp file
//! and rename so a crash never leaves a half-written map behind.
//!
//! TRADE-OFFS
//! ==========
//! A corrupt file is treated as empty (logged) rather than an error; losing a
//! persisted sidebar flag or credential only costs the user a re-login.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::AuthError;

pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the value stored under `key`. A value of the wrong shape reads as `None`.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AuthError> {
        let _guard = self.lock.lock().await;
        let map = self.read_map().await?;
        Ok(map
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    pub async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AuthError> {
        let value = serde_json::to_value(value).map_err(|e| AuthError::Storage(e.to_string()))?;
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_owned(), value);
        self.write_map(&map).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), AuthError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        if map.remove(key).is_none() {
            return Ok(());
        }
        self.write_map(&map).await
    }

    async fn read_map(&self) -> Result<Map<String, Value>, AuthError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(AuthError::Storage(e.to_string())),
        };
        match serde_json::from_str::<Map<String, Value>>(&raw) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file is not a JSON object; treating as empty");
                Ok(Map::new())
            }
        }
    }

    async fn write_map(&self, map: &Map<String, Value>) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AuthError::Storage(e.to_string()))?;
        }
        let raw = serde_json::to_vec_pretty(map).map_err(|e| AuthError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
