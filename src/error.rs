// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types shared by the auth client, the profile store and the session manager.

/// Errors surfaced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Auth service error: {0}")]
    Auth(String),

    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid request: {0}")]
    Validation(String),
}

impl SessionError {
    /// Message fragments the auth service uses when a refresh credential is rejected.
    pub(crate) const REFRESH_TOKEN_MARKERS: [&'static str; 3] =
        ["invalid refresh token", "refresh token not found", "invalid_grant"];

    /// Check whether this error means the stored refresh credential is unusable.
    ///
    /// Auth failures are reported as free text by some endpoints, so the
    /// message is matched as well as the dedicated variant.
    pub fn is_refresh_token_error(&self) -> bool {
        match self {
            SessionError::InvalidRefreshToken => true,
            SessionError::Auth(msg) => {
                let msg = msg.to_lowercase();
                Self::REFRESH_TOKEN_MARKERS
                    .iter()
                    .any(|marker| msg.contains(marker))
            }
            _ => false,
        }
    }
}

impl From<validator::ValidationErrors> for SessionError {
    fn from(errors: validator::ValidationErrors) -> Self {
        SessionError::Validation(errors.to_string())
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
