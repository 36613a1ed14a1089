// src/core/reference.rs
//! Cache-backed accessors for vacancy details and the platform's
//! static reference dictionaries. Thin read-through wrappers: each one
//! is an [`ApiClient`] call behind the 7-day cache.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::core::api_client::ApiClient;
use crate::core::cache::{CacheKind, CacheRepository, DEFAULT_TTL};
use crate::core::error::ClientError;

const DICTIONARIES_KEY: &str = "main_dictionaries";
const AREAS_KEY: &str = "areas";
const PROFESSIONAL_ROLES_KEY: &str = "professional_roles";

pub struct ReferenceData {
    client: Arc<ApiClient>,
    cache: CacheRepository,
    ttl: Duration,
}

impl ReferenceData {
    pub fn new(client: Arc<ApiClient>, cache: CacheRepository) -> Self {
        Self {
            client,
            cache,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Full detail payload for one vacancy.
    pub async fn vacancy_details(&self, vacancy_id: &str) -> Result<Value, ClientError> {
        self.cache
            .get_or_fetch(CacheKind::Vacancy, vacancy_id, self.ttl, || async {
                self.client.vacancy_details(vacancy_id).await
            })
            .await
    }

    /// The combined dictionaries payload (schedules, employment types,
    /// work formats and the rest).
    pub async fn main_dictionaries(&self) -> Result<Value, ClientError> {
        self.cache
            .get_or_fetch(CacheKind::Dictionary, DICTIONARIES_KEY, self.ttl, || async {
                self.client.dictionaries().await
            })
            .await
    }

    /// Region tree.
    pub async fn areas(&self) -> Result<Value, ClientError> {
        self.cache
            .get_or_fetch(CacheKind::Dictionary, AREAS_KEY, self.ttl, || async {
                self.client.areas().await
            })
            .await
    }

    /// Professional role catalog.
    pub async fn professional_roles(&self) -> Result<Value, ClientError> {
        self.cache
            .get_or_fetch(CacheKind::Dictionary, PROFESSIONAL_ROLES_KEY, self.ttl, || async {
                self.client.professional_roles().await
            })
            .await
    }
}
