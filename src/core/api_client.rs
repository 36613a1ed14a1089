// src/core/api_client.rs
//! Authenticated HTTP client for the recruiting platform API.
//!
//! Every call goes through [`ApiClient::execute`], which injects the
//! bearer token and applies the retry policy: refresh an invalid token
//! before sending, and on a 401 from the platform (clock skew or a
//! revoked token that still looked valid locally) refresh and retry
//! exactly once. A second 401 is terminal. Other non-2xx responses are
//! surfaced verbatim and never retried.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::core::database::{Profile, ProfileRepository};
use crate::core::error::{AuthError, ClientError};
use crate::core::token::{Credentials, TokenManager};
use crate::types::api::{
    ApplyErrorBody, ApplyOutcome, NegotiationPage, ResumeCollection, UserInfo, VacancyPage,
};

/// Query shape for vacancy search; mirrors the platform's filter set.
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub text: Option<String>,
    pub area: Option<String>,
    pub professional_roles: Vec<String>,
    pub period: Option<u32>,
    pub work_format: Option<String>,
    pub search_field: Option<String>,
}

impl SearchParams {
    fn to_query(&self, page: u32, per_page: u32) -> Vec<(String, String)> {
        let mut query = vec![
            ("page".to_string(), page.to_string()),
            ("per_page".to_string(), per_page.to_string()),
        ];
        if let Some(text) = &self.text {
            query.push(("text".to_string(), text.clone()));
        }
        if let Some(area) = &self.area {
            query.push(("area".to_string(), area.clone()));
        }
        for role in &self.professional_roles {
            query.push(("professional_role".to_string(), role.clone()));
        }
        if let Some(period) = self.period {
            query.push(("period".to_string(), period.to_string()));
        }
        if let Some(work_format) = &self.work_format {
            query.push(("work_format".to_string(), work_format.clone()));
        }
        if let Some(search_field) = &self.search_field {
            query.push(("search_field".to_string(), search_field.clone()));
        }
        query
    }
}

struct ClientState {
    profile: Profile,
    credentials: Credentials,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: TokenManager,
    state: Mutex<ClientState>,
}

impl ApiClient {
    pub fn new(
        config: &AppConfig,
        profiles: ProfileRepository,
        profile: Profile,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.api.timeout_seconds))
            .user_agent(&config.api.user_agent)
            .build()?;

        let token = TokenManager::new(
            http.clone(),
            config.oauth.clone(),
            config.api.base_url.clone(),
            profiles,
        );

        let credentials = Credentials::from_profile(&profile);
        Ok(Self {
            http,
            base_url: config.api.base_url.clone(),
            token,
            state: Mutex::new(ClientState {
                profile,
                credentials,
            }),
        })
    }

    pub async fn profile(&self) -> Profile {
        self.state.lock().await.profile.clone()
    }

    pub async fn profile_name(&self) -> String {
        self.state.lock().await.profile.profile_name.clone()
    }

    /// Execute one authenticated request. `Ok(None)` means the platform
    /// answered 204 (or an empty success body), which is distinct from
    /// a JSON `null` payload.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, ClientError> {
        // Never send a request known to be unauthenticated; a failed
        // refresh here is surfaced before the platform is contacted.
        self.ensure_valid().await?;

        let response = self.send(method.clone(), path, query, body).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::decode(response).await;
        }

        // Stale despite the local validity check. One refresh, one retry.
        warn!("HTTP 401 from {}, refreshing token and retrying once", path);
        self.refresh_credentials().await?;

        let retry = self.send(method, path, query, body).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(AuthError::Unauthorized.into());
        }
        Self::decode(retry).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let access_token = self.state.lock().await.credentials.access_token.clone();

        let mut request = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(access_token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!("API request: {}", path);
        Ok(request.send().await?)
    }

    async fn decode(response: reqwest::Response) -> Result<Option<Value>, ClientError> {
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn ensure_valid(&self) -> Result<(), ClientError> {
        {
            let state = self.state.lock().await;
            if state.credentials.is_valid() {
                return Ok(());
            }
        }
        self.refresh_credentials().await
    }

    /// Refresh the held token set and persist it onto the profile row.
    /// The in-memory credentials are replaced so every later call uses
    /// the fresh token.
    async fn refresh_credentials(&self) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        let fresh = self.token.refresh(&state.credentials).await?;
        self.token.persist_refreshed(&state.profile, &fresh).await?;
        state.profile.access_token = fresh.access_token.clone();
        state.profile.refresh_token = fresh.refresh_token.clone();
        state.profile.expires_at = fresh.expires_at;
        state.credentials = fresh;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, ClientError> {
        let value = self
            .execute(Method::GET, path, query, None)
            .await?
            .ok_or(ClientError::InvalidResponse("unexpected empty response body"))?;
        Ok(serde_json::from_value(value)?)
    }

    // ===== Typed endpoints =====

    pub async fn me(&self) -> Result<UserInfo, ClientError> {
        self.get_json("/me", &[]).await
    }

    pub async fn my_resumes(&self) -> Result<ResumeCollection, ClientError> {
        self.get_json("/resumes/mine", &[]).await
    }

    pub async fn search_vacancies(
        &self,
        params: &SearchParams,
        page: u32,
        per_page: u32,
    ) -> Result<VacancyPage, ClientError> {
        self.get_json("/vacancies", &params.to_query(page, per_page))
            .await
    }

    /// Vacancies the platform suggests for a resume.
    pub async fn similar_vacancies(
        &self,
        resume_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<VacancyPage, ClientError> {
        let query = vec![
            ("page".to_string(), page.to_string()),
            ("per_page".to_string(), per_page.to_string()),
        ];
        self.get_json(&format!("/resumes/{resume_id}/similar_vacancies"), &query)
            .await
    }

    /// Raw vacancy detail payload, kept as JSON for the detail cache.
    pub async fn vacancy_details(&self, vacancy_id: &str) -> Result<Value, ClientError> {
        self.execute(Method::GET, &format!("/vacancies/{vacancy_id}"), &[], None)
            .await?
            .ok_or(ClientError::InvalidResponse("unexpected empty response body"))
    }

    /// One page of the negotiation history, oldest change first so the
    /// sync walk can advance a watermark behind it.
    pub async fn negotiations(
        &self,
        date_from: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<NegotiationPage, ClientError> {
        let mut query = vec![
            ("page".to_string(), page.to_string()),
            ("per_page".to_string(), per_page.to_string()),
            ("order_by".to_string(), "updated_at".to_string()),
        ];
        if let Some(date_from) = date_from {
            query.push(("date_from".to_string(), date_from.to_string()));
        }
        self.get_json("/negotiations", &query).await
    }

    /// Apply to a vacancy. A rejected application is a normal outcome,
    /// not an error: the platform's reason code (first element of the
    /// `errors` array) is extracted, with `http_<status>` standing in
    /// when the body cannot be parsed. Auth and network failures still
    /// propagate as errors.
    pub async fn apply_to_vacancy(
        &self,
        resume_id: &str,
        vacancy_id: &str,
        message: &str,
    ) -> Result<ApplyOutcome, ClientError> {
        let body = json!({
            "resume_id": resume_id,
            "vacancy_id": vacancy_id,
            "message": message,
        });

        match self.execute(Method::POST, "/negotiations", &[], Some(&body)).await {
            Ok(_) => Ok(ApplyOutcome::applied()),
            Err(ClientError::Api { status, body }) => {
                let reason = serde_json::from_str::<ApplyErrorBody>(&body)
                    .ok()
                    .and_then(|parsed| parsed.errors.into_iter().next())
                    .and_then(|item| item.value.or(item.kind))
                    .unwrap_or_else(|| format!("http_{status}"));
                warn!("Apply to vacancy {} rejected: {}", vacancy_id, reason);
                Ok(ApplyOutcome::failed(reason))
            }
            Err(other) => Err(other),
        }
    }

    // ===== Reference payloads (cached by the read-through layer) =====

    pub async fn dictionaries(&self) -> Result<Value, ClientError> {
        self.execute(Method::GET, "/dictionaries", &[], None)
            .await?
            .ok_or(ClientError::InvalidResponse("unexpected empty response body"))
    }

    pub async fn areas(&self) -> Result<Value, ClientError> {
        self.execute(Method::GET, "/areas", &[], None)
            .await?
            .ok_or(ClientError::InvalidResponse("unexpected empty response body"))
    }

    pub async fn professional_roles(&self) -> Result<Value, ClientError> {
        self.execute(Method::GET, "/professional_roles", &[], None)
            .await?
            .ok_or(ClientError::InvalidResponse("unexpected empty response body"))
    }
}
