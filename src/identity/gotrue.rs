//! GoTrue-style auth API client implementing `IdentityProvider`.
//!
//! DESIGN
//! ======
//! Thin HTTP wrapper over `/auth/v1/token` (password and refresh-token
//! grants) and `/auth/v1/logout`. The current session is cached in memory and
//! persisted to the JSON state file so a restart can restore it. Every local
//! session change is broadcast to subscribers. Pure parsing lives in
//! `parse_token_response` / `parse_auth_error` for testability.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{IdentityProvider, SessionBroadcaster, SessionSubscription};
use crate::config::BackendConfig;
use crate::error::AuthError;
use crate::storage::JsonFileStore;
use crate::types::{Principal, Session, SessionEvent};

const SESSION_KEY: &str = "auth.session";
/// Refresh tokens this close to expiry instead of handing them out.
const REFRESH_MARGIN_SECS: i64 = 60;

// =============================================================================
// CLIENT
// =============================================================================

pub struct GoTrueIdentity {
    http: reqwest::Client,
    auth_url: String,
    anon_key: String,
    current: RwLock<Option<Session>>,
    storage: Arc<JsonFileStore>,
    events: SessionBroadcaster,
}

impl GoTrueIdentity {
    pub fn new(config: &BackendConfig, storage: Arc<JsonFileStore>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            auth_url: format!("{}/auth/v1", config.url),
            anon_key: config.anon_key.clone(),
            current: RwLock::new(None),
            storage,
            events: SessionBroadcaster::new(),
        })
    }

    /// Access token of the cached session, if any. Does not hit the network.
    pub async fn access_token(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    /// Exchange a refresh token for a new session. Emits `TokenRefreshed`.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let url = format!("{}/token?grant_type=refresh_token", self.auth_url);
        let body = serde_json::json!({ "refresh_token": refresh_token });
        let session = self.token_request(&url, &body).await?;
        self.store_session(&session).await;
        self.events.emit(SessionEvent::token_refreshed(session.clone()));
        debug!(principal_id = %session.principal.id, "session refreshed");
        Ok(session)
    }

    async fn token_request(&self, url: &str, body: &serde_json::Value) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        if status != 200 {
            return Err(parse_auth_error(status, &text));
        }
        parse_token_response(&text, now_unix())
    }

    async fn restore(&self) -> Option<Session> {
        match self.storage.load::<Session>(SESSION_KEY).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "failed to read persisted session");
                None
            }
        }
    }

    async fn store_session(&self, session: &Session) {
        *self.current.write().await = Some(session.clone());
        if let Err(e) = self.storage.save(SESSION_KEY, session).await {
            warn!(error = %e, "failed to persist session");
        }
    }

    async fn clear_local(&self) {
        *self.current.write().await = None;
        if let Err(e) = self.storage.remove(SESSION_KEY).await {
            warn!(error = %e, "failed to clear persisted session");
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for GoTrueIdentity {
    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        let cached = self.current.read().await.clone();
        let session = match cached {
            Some(session) => Some(session),
            None => self.restore().await,
        };
        let Some(session) = session else {
            return Ok(None);
        };

        if !session.expires_within(now_unix(), REFRESH_MARGIN_SECS) {
            *self.current.write().await = Some(session.clone());
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.clone() else {
            info!(principal_id = %session.principal.id, "session expired without refresh token");
            self.clear_local().await;
            return Ok(None);
        };

        match self.refresh_session(&refresh_token).await {
            Ok(session) => Ok(Some(session)),
            Err(e) if e.retryable() => Err(e),
            Err(e) => {
                warn!(error = %e, "refresh rejected; dropping session");
                self.clear_local().await;
                self.events.emit(SessionEvent::signed_out());
                Ok(None)
            }
        }
    }

    fn on_session_change(&self) -> SessionSubscription {
        self.events.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let url = format!("{}/token?grant_type=password", self.auth_url);
        let body = serde_json::json!({ "email": email, "password": password });
        let session = self.token_request(&url, &body).await?;
        self.store_session(&session).await;
        self.events.emit(SessionEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let token = self.access_token().await;
        let remote = match token {
            Some(token) => self.logout_request(&token).await,
            None => Ok(()),
        };
        // Local state is cleared whatever the remote outcome.
        self.clear_local().await;
        self.events.emit(SessionEvent::signed_out());
        remote
    }
}

impl GoTrueIdentity {
    async fn logout_request(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AuthError::Api { status: status.as_u16(), body })
    }
}

fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: WireUser,
}

#[derive(serde::Deserialize)]
struct WireUser {
    id: Uuid,
    email: Option<String>,
}

#[derive(serde::Deserialize, Default)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

pub(crate) fn parse_token_response(json: &str, now: i64) -> Result<Session, AuthError> {
    let wire: TokenResponse = serde_json::from_str(json).map_err(|e| AuthError::Parse(e.to_string()))?;
    let expires_at = wire
        .expires_at
        .or_else(|| wire.expires_in.map(|secs| now + secs));
    Ok(Session {
        access_token: wire.access_token,
        refresh_token: wire.refresh_token.filter(|t| !t.is_empty()),
        expires_at,
        principal: Principal { id: wire.user.id, email: wire.user.email },
    })
}

/// Map a non-200 auth response to an error. Client-side rejections carrying a
/// message become `InvalidCredentials` with the backend's wording.
pub(crate) fn parse_auth_error(status: u16, body: &str) -> AuthError {
    let wire: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = wire
        .error_description
        .or(wire.msg)
        .or(wire.message)
        .or(wire.error)
        .or(wire.error_code)
        .filter(|m| !m.trim().is_empty());

    match (status, message) {
        (400 | 401 | 422, Some(message)) => AuthError::InvalidCredentials { message },
        _ => AuthError::Api { status, body: body.to_owned() },
    }
}

#[cfg(test)]
#[path = "gotrue_test.rs"]
mod tests;
