// src/core/error.rs
//! Error taxonomy for the sync client.
//!
//! `AuthError` covers every condition that means "re-authenticate
//! required"; callers branch on it and send the user back through the
//! browser flow. Everything else the remote API can do wrong lands in
//! `ClientError::Api` with the status and body kept verbatim.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("token refresh rejected with HTTP {status}: {body}")]
    RefreshRejected { status: u16, body: String },

    #[error("authorization code exchange rejected with HTTP {status}: {body}")]
    ExchangeRejected { status: u16, body: String },

    /// The API returned 401 again after a fresh token. The token the
    /// platform just issued is not accepted, so retrying is pointless.
    #[error("request unauthorized after token refresh")]
    Unauthorized,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("re-authentication required: {0}")]
    Auth(#[from] AuthError),

    #[error("API error HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),
}

impl ClientError {
    /// True when the only way forward is a new interactive authorization.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, ClientError::Auth(_))
    }
}
