//! Error taxonomy for the session core.
//!
//! ERROR HANDLING
//! ==============
//! Every collaborator call returns `AuthError`. The lifecycle manager never
//! lets one escape into UI code during bootstrap: transient errors are
//! retried, everything else degrades into a valid `SessionState`. Only
//! sign-in surfaces an error to the caller, for display.

use std::time::Duration;

/// Errors produced by identity, role-store, storage and config operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// A required environment variable is not set.
    #[error("missing required env var {var}")]
    MissingEnv { var: String },

    /// The email did not survive normalization.
    #[error("invalid email")]
    InvalidEmail,

    /// The identity provider rejected the credentials. Carries the backend message.
    #[error("{message}")]
    InvalidCredentials { message: String },

    /// The HTTP request never produced a response.
    #[error("request failed: {0}")]
    Request(String),

    /// A single attempt exceeded its deadline.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The backend returned a non-success HTTP status.
    #[error("backend responded with status {status}")]
    Api { status: u16, body: String },

    /// The backend response body could not be deserialized.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The role store returned a role outside the known set.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// Reading or writing the local state file failed.
    #[error("local storage error: {0}")]
    Storage(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl AuthError {
    /// Stable machine-readable code for logs and toasts.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::MissingEnv { .. } => "E_MISSING_ENV",
            Self::InvalidEmail => "E_INVALID_EMAIL",
            Self::InvalidCredentials { .. } => "E_INVALID_CREDENTIALS",
            Self::Request(_) => "E_REQUEST",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::Api { .. } => "E_API_RESPONSE",
            Self::Parse(_) => "E_PARSE",
            Self::UnknownRole(_) => "E_UNKNOWN_ROLE",
            Self::Storage(_) => "E_STORAGE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    /// Whether the failure is transient/network-class and worth another attempt.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::Timeout(_) | Self::Api { status: 408 | 429 | 500..=599, .. }
        )
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
