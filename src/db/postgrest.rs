// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! REST table client for the hosted profiles table.
//!
//! Requests carry the project anon key as `apikey` and the signed-in user's
//! access token as bearer, so row-level security applies per user.

use crate::config::Config;
use crate::db::{ProfileLookup, ProfileStore};
use crate::error::{Result, SessionError};
use crate::models::{ProfilePatch, ProfileRow};
use crate::services::auth::SessionCache;
use async_trait::async_trait;
use serde::Deserialize;

/// Error code returned when a single-row select matches nothing.
pub const ROW_NOT_FOUND_CODE: &str = "PGRST116";

/// Media type asking the server for exactly one object instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Profiles table client.
#[derive(Clone)]
pub struct PostgrestProfileStore {
    http: reqwest::Client,
    base_url: String,
    table: String,
    anon_key: String,
    session: SessionCache,
}

impl PostgrestProfileStore {
    /// Create a store for the configured project, authenticating with `session`.
    pub fn new(config: &Config, session: SessionCache) -> Self {
        Self::with_base_url(
            config.rest_url(),
            config.profiles_table.clone(),
            config.supabase_anon_key.clone(),
            session,
        )
    }

    /// Create a store against an explicit REST base URL (e.g. `http://host/rest/v1`).
    pub fn with_base_url(
        base_url: String,
        table: String,
        anon_key: String,
        session: SessionCache,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            table,
            anon_key,
            session,
        }
    }

    fn table_url(&self) -> String {
        format!("{}/{}", self.base_url, self.table)
    }

    fn id_filter(id: &str) -> String {
        format!("eq.{}", id)
    }

    /// Request builder with project key and bearer (user token, else anon key).
    async fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let bearer = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone());

        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    /// Check response status and return error if not successful.
    async fn check_response(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<RestErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(body);

        Err(SessionError::Database(format!("HTTP {}: {}", status, detail)))
    }
}

#[async_trait]
impl ProfileStore for PostgrestProfileStore {
    async fn fetch(&self, id: &str) -> Result<ProfileLookup> {
        let response = self
            .request(reqwest::Method::GET, &self.table_url())
            .await
            .header("Accept", SINGLE_OBJECT)
            .query(&[("id", Self::id_filter(id).as_str()), ("select", "*")])
            .send()
            .await
            .map_err(|e| SessionError::Database(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_ACCEPTABLE {
            let body = response.text().await.unwrap_or_default();
            let code = serde_json::from_str::<RestErrorBody>(&body)
                .ok()
                .and_then(|b| b.code);
            if code.as_deref() == Some(ROW_NOT_FOUND_CODE) {
                tracing::debug!(user_id = %id, "Profile row not found");
                return Ok(ProfileLookup::NotFound);
            }
            return Err(SessionError::Database(format!("HTTP 406: {}", body)));
        }

        let row: ProfileRow = self
            .check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| SessionError::Database(format!("JSON parse error: {}", e)))?;

        Ok(ProfileLookup::Found(row))
    }

    async fn insert(&self, row: &ProfileRow) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, &self.table_url())
            .await
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await
            .map_err(|e| SessionError::Database(e.to_string()))?;

        self.check_response(response).await?;
        tracing::debug!(user_id = %row.id, "Profile row inserted");
        Ok(())
    }

    async fn update(&self, id: &str, patch: &ProfilePatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let response = self
            .request(reqwest::Method::PATCH, &self.table_url())
            .await
            .header("Prefer", "return=minimal")
            .query(&[("id", Self::id_filter(id).as_str())])
            .json(patch)
            .send()
            .await
            .map_err(|e| SessionError::Database(e.to_string()))?;

        self.check_response(response).await?;
        tracing::debug!(user_id = %id, "Profile row updated");
        Ok(())
    }
}

/// Error payload returned by the REST endpoint.
#[derive(Debug, Deserialize)]
struct RestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}
