// src/core/token.rs
//! OAuth2 token lifecycle: authorization-code exchange, refresh grant,
//! expiry bookkeeping and persistence into the profile store.
//!
//! The manager is the only writer of access/refresh tokens. Expiry is
//! recomputed locally from `expires_in` on every grant; validity is a
//! strict `expires_at > now` with no clock-skew grace.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::OauthConfig;
use crate::core::database::{Profile, ProfileRepository};
use crate::core::error::{AuthError, ClientError};
use crate::types::api::{TokenResponse, UserInfo};

const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// One token set as held in memory while the client runs.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            access_token: profile.access_token.clone(),
            refresh_token: profile.refresh_token.clone(),
            expires_at: profile.expires_at,
        }
    }

    fn from_token_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: now + Duration::seconds(expires_in),
        }
    }

    /// True iff an access token is present and not expired at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.expires_at > now
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

pub struct TokenManager {
    http: reqwest::Client,
    oauth: OauthConfig,
    api_base_url: String,
    profiles: ProfileRepository,
}

impl TokenManager {
    pub fn new(
        http: reqwest::Client,
        oauth: OauthConfig,
        api_base_url: String,
        profiles: ProfileRepository,
    ) -> Self {
        Self {
            http,
            oauth,
            api_base_url,
            profiles,
        }
    }

    /// The browser-facing authorization URL for the interactive flow.
    pub fn authorize_url(&self) -> String {
        format!(
            "{}/authorize?response_type=code&client_id={}&redirect_uri={}",
            self.oauth.base_url, self.oauth.client_id, self.oauth.redirect_uri()
        )
    }

    /// One-shot exchange of an authorization code for a token set.
    /// Also resolves the remote account summary, which the profile
    /// upsert is keyed by.
    pub async fn exchange_code(&self, code: &str) -> Result<(Credentials, UserInfo), ClientError> {
        let response = self
            .http
            .post(format!("{}/token", self.oauth.base_url))
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.oauth.client_id.as_str()),
                ("client_secret", self.oauth.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", &self.oauth.redirect_uri()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Authorization code exchange failed: HTTP {}", status);
            return Err(AuthError::ExchangeRejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let token_response: TokenResponse = response.json().await?;
        let credentials = Credentials::from_token_response(token_response, Utc::now());

        let user = self.fetch_me(&credentials).await?;
        info!("Authorized remote user {}", user.id);

        Ok((credentials, user))
    }

    /// Refresh-grant exchange. Fails without a refresh token; a
    /// rejected grant means the session is gone and the caller must
    /// send the user back through the browser flow.
    pub async fn refresh(&self, credentials: &Credentials) -> Result<Credentials, ClientError> {
        if credentials.refresh_token.is_empty() {
            return Err(AuthError::NoRefreshToken.into());
        }

        info!("Access token invalid, refreshing");
        let response = self
            .http
            .post(format!("{}/token", self.oauth.base_url))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", credentials.refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshRejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let token_response: TokenResponse = response.json().await?;
        info!("Access token refreshed");
        Ok(Credentials::from_token_response(token_response, Utc::now()))
    }

    /// Persist a token set for a named profile, keyed by the remote
    /// user id so a re-authorization never duplicates the account.
    pub async fn persist(
        &self,
        profile_name: &str,
        user: &UserInfo,
        credentials: &Credentials,
    ) -> Result<Profile, ClientError> {
        let profile = Profile {
            profile_name: profile_name.to_string(),
            remote_user_id: user.id.clone(),
            email: user.email.clone().unwrap_or_default(),
            access_token: credentials.access_token.clone(),
            refresh_token: credentials.refresh_token.clone(),
            expires_at: credentials.expires_at,
        };
        self.profiles.save_or_update(&profile).await?;
        Ok(profile)
    }

    /// Persist refreshed tokens onto an existing profile row.
    pub async fn persist_refreshed(
        &self,
        profile: &Profile,
        credentials: &Credentials,
    ) -> Result<(), ClientError> {
        let updated = Profile {
            access_token: credentials.access_token.clone(),
            refresh_token: credentials.refresh_token.clone(),
            expires_at: credentials.expires_at,
            ..profile.clone()
        };
        self.profiles.save_or_update(&updated).await
    }

    async fn fetch_me(&self, credentials: &Credentials) -> Result<UserInfo, ClientError> {
        let response = self
            .http
            .get(format!("{}/me", self.api_base_url))
            .bearer_auth(&credentials.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}
