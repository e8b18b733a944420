//! PostgREST-style role lookup implementing `RoleStore`.
//!
//! Reads `GET /rest/v1/{table}?id=eq.{principal}&select=role`, authorized
//! with the signed-in user's access token so row-level security applies. An
//! empty result set or a null `role` column both mean "no role record".

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::{GoTrueIdentity, RoleStore};
use crate::config::BackendConfig;
use crate::error::AuthError;
use crate::types::Role;

pub struct PostgrestRoleStore {
    http: reqwest::Client,
    rest_url: String,
    anon_key: String,
    table: String,
    identity: Arc<GoTrueIdentity>,
}

impl PostgrestRoleStore {
    pub fn new(config: &BackendConfig, identity: Arc<GoTrueIdentity>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            rest_url: format!("{}/rest/v1", config.url),
            anon_key: config.anon_key.clone(),
            table: config.role_table.clone(),
            identity,
        })
    }
}

#[async_trait::async_trait]
impl RoleStore for PostgrestRoleStore {
    async fn fetch_role(&self, principal_id: Uuid) -> Result<Option<Role>, AuthError> {
        let bearer = self
            .identity
            .access_token()
            .await
            .unwrap_or_else(|| self.anon_key.clone());
        let id_filter = format!("eq.{principal_id}");

        let response = self
            .http
            .get(format!("{}/{}", self.rest_url, self.table))
            .query(&[("id", id_filter.as_str()), ("select", "role"), ("limit", "1")])
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        if status != 200 {
            return Err(AuthError::Api { status, body: text });
        }
        parse_role_rows(&text)
    }
}

#[derive(serde::Deserialize)]
struct RoleRow {
    role: Option<String>,
}

pub(crate) fn parse_role_rows(json: &str) -> Result<Option<Role>, AuthError> {
    let rows: Vec<RoleRow> = serde_json::from_str(json).map_err(|e| AuthError::Parse(e.to_string()))?;
    let Some(raw) = rows.into_iter().next().and_then(|row| row.role) else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    raw.parse::<Role>().map(Some)
}

#[cfg(test)]
#[path = "role_store_test.rs"]
mod tests;
