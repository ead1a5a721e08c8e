// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Auth service boundary and its HTTP client.
//!
//! Handles:
//! - Email/password sign up and sign in
//! - Session refresh when the access token is about to expire
//! - Sign out (remote invalidation + local clear)
//! - Identity change notifications for subscribers

use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::models::{AuthChangeEvent, AuthEvent, Identity, Session, UserMetadata};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Margin before session expiration when we proactively refresh (1 minute).
const SESSION_REFRESH_MARGIN_SECS: i64 = 60;

/// Buffered identity change notifications per subscriber.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Identity lifecycle operations consumed by the session manager.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Current session, refreshed if it is about to expire.
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Subscribe to identity change notifications.
    fn subscribe(&self) -> AuthSubscription;

    /// Create credentials; `metadata` is stored on the identity.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<Identity>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;

    /// Invalidate the current session.
    async fn sign_out(&self) -> Result<()>;

    /// Current identity as known to the auth service (fresh metadata).
    async fn get_user(&self) -> Result<Option<Identity>>;
}

/// Live subscription to identity change notifications.
///
/// Dropping the subscription (or calling [`AuthSubscription::unsubscribe`])
/// stops delivery.
pub struct AuthSubscription {
    rx: broadcast::Receiver<AuthEvent>,
}

impl AuthSubscription {
    pub fn new(rx: broadcast::Receiver<AuthEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next notification. Returns `None` once the sender is gone.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Auth subscriber lagged, dropped notifications");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Stop delivery now.
    pub fn unsubscribe(self) {
        drop(self.rx);
        tracing::debug!("Unsubscribed from auth notifications");
    }
}

/// Shared handle to the current session, readable by other clients that
/// need the access token.
pub type SessionCache = Arc<RwLock<Option<Session>>>;

/// HTTP client for the hosted auth endpoints.
#[derive(Clone)]
pub struct GoTrueClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: SessionCache,
    events: broadcast::Sender<AuthEvent>,
}

impl GoTrueClient {
    /// Create a client for the configured project.
    pub fn new(config: &Config) -> Self {
        Self::with_base_url(config.auth_url(), config.supabase_anon_key.clone())
    }

    /// Create a client against an explicit auth base URL (e.g. `http://host/auth/v1`).
    pub fn with_base_url(base_url: String, anon_key: String) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            http: reqwest::Client::new(),
            base_url,
            anon_key,
            session: Arc::new(RwLock::new(None)),
            events,
        }
    }

    /// Session handle shared with the profile store.
    pub fn session_cache(&self) -> SessionCache {
        self.session.clone()
    }

    /// Seed a previously persisted session.
    pub async fn restore_session(&self, session: Session) {
        let session = normalize_expiry(session);
        *self.session.write().await = Some(session.clone());
        self.emit(AuthChangeEvent::InitialSession, Some(session));
    }

    fn emit(&self, kind: AuthChangeEvent, session: Option<Session>) {
        // No receivers is fine
        let _ = self.events.send(AuthEvent::new(kind, session));
    }

    async fn store_session(&self, session: Session, kind: AuthChangeEvent) -> Session {
        let session = normalize_expiry(session);
        *self.session.write().await = Some(session.clone());
        self.emit(kind, Some(session.clone()));
        session
    }

    async fn clear_session(&self) {
        let had_session = self.session.write().await.take().is_some();
        if had_session {
            self.emit(AuthChangeEvent::SignedOut, None);
        }
    }

    /// Exchange the refresh token for a new session.
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session> {
        let url = format!("{}/token?grant_type=refresh_token", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| SessionError::Auth(format!("Session refresh request failed: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            if is_rejected_refresh(status, &body) {
                tracing::warn!(status = %status, body = %body, "Refresh token rejected");
                return Err(SessionError::InvalidRefreshToken);
            }
            // Rate limits and timeouts leave the session usable
            tracing::warn!(status = %status, body = %body, "Session refresh failed");
            return Err(auth_error(status, &body));
        }

        self.check_response_json(response).await
    }

    /// Check response status and return error if not successful.
    async fn check_response(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(auth_error(status, &body))
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        self.check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| SessionError::Auth(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl AuthService for GoTrueClient {
    async fn get_session(&self) -> Result<Option<Session>> {
        let current = self.session.read().await.clone();
        let session = match current {
            Some(s) => s,
            None => return Ok(None),
        };

        let now = chrono::Utc::now().timestamp();
        if !session.expires_within(now, SESSION_REFRESH_MARGIN_SECS) {
            return Ok(Some(session));
        }

        tracing::info!(user_id = %session.user.id, "Session expiring, refreshing");
        match self.refresh_session(&session.refresh_token).await {
            Ok(fresh) => Ok(Some(
                self.store_session(fresh, AuthChangeEvent::TokenRefreshed)
                    .await,
            )),
            Err(e) => {
                if e.is_refresh_token_error() {
                    self.clear_session().await;
                }
                Err(e)
            }
        }
    }

    fn subscribe(&self) -> AuthSubscription {
        AuthSubscription::new(self.events.subscribe())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<Identity> {
        let url = format!("{}/signup", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": metadata,
            }))
            .send()
            .await
            .map_err(|e| SessionError::Auth(format!("Sign up request failed: {}", e)))?;

        // With email confirmation on, only the user comes back.
        match self.check_response_json::<SignUpResponse>(response).await? {
            SignUpResponse::Session(session) => {
                let session = self.store_session(session, AuthChangeEvent::SignedIn).await;
                tracing::info!(user_id = %session.user.id, "Signed up with session");
                Ok(session.user)
            }
            SignUpResponse::User(identity) => {
                tracing::info!(user_id = %identity.id, "Signed up, confirmation pending");
                Ok(identity)
            }
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let url = format!("{}/token?grant_type=password", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| SessionError::Auth(format!("Sign in request failed: {}", e)))?;

        let session: Session = self.check_response_json(response).await.map_err(|e| {
            // Password grant rejections come back as invalid_grant
            if e.is_refresh_token_error() {
                SessionError::InvalidCredentials
            } else {
                e
            }
        })?;

        let session = self.store_session(session, AuthChangeEvent::SignedIn).await;
        tracing::info!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let access_token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone());

        let remote = match access_token {
            Some(token) => {
                let url = format!("{}/logout", self.base_url);
                match self
                    .http
                    .post(&url)
                    .header("apikey", &self.anon_key)
                    .bearer_auth(token)
                    .send()
                    .await
                {
                    // Session already gone on the server side
                    Ok(r) if r.status().as_u16() == 401 || r.status().as_u16() == 404 => Ok(()),
                    Ok(r) => self.check_response(r).await.map(|_| ()),
                    Err(e) => Err(SessionError::Auth(format!("Sign out request failed: {}", e))),
                }
            }
            None => Ok(()),
        };

        self.clear_session().await;
        remote
    }

    async fn get_user(&self) -> Result<Option<Identity>> {
        let access_token = match self.get_session().await? {
            Some(s) => s.access_token,
            None => return Ok(None),
        };

        let url = format!("{}/user", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| SessionError::Auth(e.to_string()))?;

        self.check_response_json(response).await.map(Some)
    }
}

/// Sign-up response: a full session when auto-confirmed, else just the user.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(Session),
    User(Identity),
}

/// Error payload returned by the auth endpoints (fields vary by version).
#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Map a failed auth response to a [`SessionError`].
fn auth_error(status: reqwest::StatusCode, body: &str) -> SessionError {
    let parsed: AuthErrorBody = serde_json::from_str(body).unwrap_or_default();

    if parsed.error_code.as_deref() == Some("invalid_credentials") {
        return SessionError::InvalidCredentials;
    }

    let message = parsed
        .msg
        .or(parsed.message)
        .or(parsed.error_description)
        .or(parsed.error)
        .unwrap_or_else(|| body.to_string());

    if message.eq_ignore_ascii_case("invalid login credentials") {
        return SessionError::InvalidCredentials;
    }

    SessionError::Auth(format!("HTTP {}: {}", status, message))
}

/// Whether a failed refresh means the refresh token itself was rejected.
///
/// Only 400/401/403 responses whose error fields name the refresh token (or
/// `invalid_grant`) qualify.
fn is_rejected_refresh(status: reqwest::StatusCode, body: &str) -> bool {
    if !matches!(status.as_u16(), 400 | 401 | 403) {
        return false;
    }

    let parsed: AuthErrorBody = serde_json::from_str(body).unwrap_or_default();
    [
        parsed.error,
        parsed.error_code,
        parsed.error_description,
        parsed.msg,
        parsed.message,
    ]
    .into_iter()
    .flatten()
    .any(|field| {
        let field = field.to_lowercase();
        SessionError::REFRESH_TOKEN_MARKERS
            .iter()
            .any(|marker| field.contains(marker))
    })
}

/// Fill in `expires_at` from `expires_in` when the endpoint omitted it.
fn normalize_expiry(mut session: Session) -> Session {
    if session.expires_at.is_none() {
        session.expires_at = session.expiry(chrono::Utc::now().timestamp());
    }
    session
}
