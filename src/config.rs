//! Backend and lifecycle configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AuthError;

pub const DEFAULT_ROLE_TABLE: &str = "profiles";
pub const DEFAULT_STATE_PATH: &str = ".fleetdesk/state.json";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_ROLE_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_ROLE_ATTEMPTS: u32 = 3;
pub const DEFAULT_ROLE_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 3;
pub const DEFAULT_PROBE_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_WATCHDOG_MS: u64 = 5000;

// =============================================================================
// RETRY POLICY
// =============================================================================

/// Bounded retry shape: `attempts` tries, each capped at `attempt_timeout`,
/// separated by a fixed `backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempt_timeout: Duration,
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn role_lookup_default() -> Self {
        Self {
            attempt_timeout: Duration::from_millis(DEFAULT_ROLE_TIMEOUT_MS),
            attempts: DEFAULT_ROLE_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_ROLE_BACKOFF_MS),
        }
    }

    #[must_use]
    pub fn probe_default() -> Self {
        Self {
            attempt_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            attempts: DEFAULT_PROBE_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_PROBE_BACKOFF_MS),
        }
    }

    /// Upper bound on wall time for a full run: every attempt times out and
    /// every backoff is slept. Saturates instead of overflowing.
    #[must_use]
    pub fn max_duration(&self) -> Duration {
        let attempts = self.attempts.max(1);
        self.attempt_timeout
            .saturating_mul(attempts)
            .saturating_add(self.backoff.saturating_mul(attempts - 1))
    }
}

// =============================================================================
// SESSION CONFIG
// =============================================================================

/// Timing knobs for the lifecycle manager. All optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub role_lookup: RetryPolicy,
    pub probe: RetryPolicy,
    pub watchdog: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            role_lookup: RetryPolicy::role_lookup_default(),
            probe: RetryPolicy::probe_default(),
            watchdog: Duration::from_millis(DEFAULT_WATCHDOG_MS),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unparseable values fall back
    /// to their defaults.
    ///
    /// - `FLEETDESK_ROLE_TIMEOUT_MS`: default 3000
    /// - `FLEETDESK_ROLE_ATTEMPTS`: default 3 (minimum 1)
    /// - `FLEETDESK_ROLE_BACKOFF_MS`: default 1000
    /// - `FLEETDESK_PROBE_TIMEOUT_MS`: default 3000
    /// - `FLEETDESK_PROBE_ATTEMPTS`: default 3 (minimum 1)
    /// - `FLEETDESK_PROBE_BACKOFF_MS`: default 1000
    /// - `FLEETDESK_WATCHDOG_MS`: default 5000
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let role_lookup = RetryPolicy {
            attempt_timeout: Duration::from_millis(parse_or(&lookup, "FLEETDESK_ROLE_TIMEOUT_MS", DEFAULT_ROLE_TIMEOUT_MS)),
            attempts: parse_or(&lookup, "FLEETDESK_ROLE_ATTEMPTS", DEFAULT_ROLE_ATTEMPTS).max(1),
            backoff: Duration::from_millis(parse_or(&lookup, "FLEETDESK_ROLE_BACKOFF_MS", DEFAULT_ROLE_BACKOFF_MS)),
        };
        let probe = RetryPolicy {
            attempt_timeout: Duration::from_millis(parse_or(
                &lookup,
                "FLEETDESK_PROBE_TIMEOUT_MS",
                DEFAULT_PROBE_TIMEOUT_MS,
            )),
            attempts: parse_or(&lookup, "FLEETDESK_PROBE_ATTEMPTS", DEFAULT_PROBE_ATTEMPTS).max(1),
            backoff: Duration::from_millis(parse_or(&lookup, "FLEETDESK_PROBE_BACKOFF_MS", DEFAULT_PROBE_BACKOFF_MS)),
        };
        let watchdog = Duration::from_millis(parse_or(&lookup, "FLEETDESK_WATCHDOG_MS", DEFAULT_WATCHDOG_MS));

        Self { role_lookup, probe, watchdog }
    }
}

// =============================================================================
// BACKEND CONFIG
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

/// Where the hosted backend lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base URL without trailing slash, e.g. `https://xyz.example.co`.
    pub url: String,
    pub anon_key: String,
    pub role_table: String,
    pub state_path: PathBuf,
    pub timeouts: HttpTimeouts,
}

impl BackendConfig {
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    ///
    /// Required:
    /// - `FLEETDESK_BACKEND_URL`
    /// - `FLEETDESK_ANON_KEY`
    ///
    /// Optional:
    /// - `FLEETDESK_ROLE_TABLE`: default `profiles`
    /// - `FLEETDESK_STATE_PATH`: default `.fleetdesk/state.json`
    /// - `FLEETDESK_HTTP_TIMEOUT_SECS`: default 30
    /// - `FLEETDESK_HTTP_CONNECT_TIMEOUT_SECS`: default 10
    pub fn from_vars<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = required(&lookup, "FLEETDESK_BACKEND_URL")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AuthError::ConfigParse(format!("FLEETDESK_BACKEND_URL must be http(s): {url}")));
        }
        let url = url.trim_end_matches('/').to_owned();
        let anon_key = required(&lookup, "FLEETDESK_ANON_KEY")?;

        let role_table = lookup("FLEETDESK_ROLE_TABLE")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE_TABLE.to_owned());
        let state_path = lookup("FLEETDESK_STATE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_STATE_PATH), PathBuf::from);
        let timeouts = HttpTimeouts {
            request_secs: parse_or(&lookup, "FLEETDESK_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
            connect_secs: parse_or(&lookup, "FLEETDESK_HTTP_CONNECT_TIMEOUT_SECS", DEFAULT_HTTP_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { url, anon_key, role_table, state_path, timeouts })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, AuthError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::MissingEnv { var: key.to_owned() })
}

pub(crate) fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
