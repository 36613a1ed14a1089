// src/core/sync.rs
//! Incremental synchronization of the negotiation history.
//!
//! The walk pages through the remote history oldest-change-first and
//! upserts every item independently, so a failure mid-walk keeps what
//! was already written. The per-profile watermark advances only after
//! a complete, error-free walk; an aborted or abandoned sync simply
//! re-covers the same range next time.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::core::api_client::ApiClient;
use crate::core::classifier::StatusClassifier;
use crate::core::database::ProfileRepository;
use crate::core::error::ClientError;
use crate::core::history::{HistoryRepository, SyncUpsert};

pub const SYNC_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub pages_fetched: u32,
    pub records_upserted: u64,
    pub records_skipped: u64,
    /// The instant the watermark was advanced to.
    pub watermark: DateTime<Utc>,
}

#[derive(Debug)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// A sync for the same profile is already in flight on this
    /// engine; the call did not touch the network.
    AlreadyRunning,
}

pub struct SyncEngine {
    client: std::sync::Arc<ApiClient>,
    profiles: ProfileRepository,
    history: HistoryRepository,
    classifier: StatusClassifier,
    in_flight: Mutex<HashSet<String>>,
}

/// Removes the profile from the in-flight set even when the sync
/// future is dropped mid-walk.
struct InFlightGuard<'a> {
    engine: &'a SyncEngine,
    profile_name: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.engine
            .in_flight
            .lock()
            .expect("in-flight registry poisoned")
            .remove(&self.profile_name);
    }
}

impl SyncEngine {
    pub fn new(
        client: std::sync::Arc<ApiClient>,
        profiles: ProfileRepository,
        history: HistoryRepository,
        classifier: StatusClassifier,
    ) -> Self {
        Self {
            client,
            profiles,
            history,
            classifier,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Synchronize the client's profile. Same-profile runs are
    /// serialized by skipping: a concurrent call returns
    /// [`SyncOutcome::AlreadyRunning`] immediately. Different profiles
    /// (separate engines/clients) are free to run in parallel.
    pub async fn sync_history(&self) -> Result<SyncOutcome, ClientError> {
        let profile_name = self.client.profile_name().await;

        {
            let mut in_flight = self
                .in_flight
                .lock()
                .expect("in-flight registry poisoned");
            if !in_flight.insert(profile_name.clone()) {
                info!("Sync already running for profile {}", profile_name);
                return Ok(SyncOutcome::AlreadyRunning);
            }
        }
        let _guard = InFlightGuard {
            engine: self,
            profile_name: profile_name.clone(),
        };

        let report = self.walk(&profile_name).await?;
        Ok(SyncOutcome::Completed(report))
    }

    async fn walk(&self, profile_name: &str) -> Result<SyncReport, ClientError> {
        let started_at = Utc::now();
        let watermark = self.profiles.sync_watermark(profile_name).await?;
        let date_from = watermark.map(|instant| instant.to_rfc3339());

        match &date_from {
            Some(from) => info!("Syncing history for {} since {}", profile_name, from),
            None => info!("First sync for {}: fetching full history", profile_name),
        }

        let mut page = 0;
        let mut pages_total = 1;
        let mut records_upserted = 0u64;
        let mut records_skipped = 0u64;

        while page < pages_total {
            // A failed page aborts the walk; the watermark stays put so
            // the next run re-covers this range.
            let result = self
                .client
                .negotiations(date_from.as_deref(), page, SYNC_PAGE_SIZE)
                .await
                .map_err(|e| {
                    warn!(
                        "Sync for {} aborted on page {}: {}",
                        profile_name, page, e
                    );
                    e
                })?;
            pages_total = result.pages;

            for item in &result.items {
                let Some(vacancy_id) = item
                    .vacancy
                    .as_ref()
                    .and_then(|v| v.id.clone())
                    .filter(|id| !id.is_empty())
                else {
                    records_skipped += 1;
                    continue;
                };

                let status = item.canonical_status();
                let upsert = SyncUpsert {
                    profile_name: profile_name.to_string(),
                    vacancy_id,
                    resume_id: item
                        .resume
                        .as_ref()
                        .and_then(|r| r.id.clone())
                        .unwrap_or_default(),
                    vacancy_title: item
                        .vacancy
                        .as_ref()
                        .and_then(|v| v.name.clone())
                        .unwrap_or_default(),
                    employer_name: item
                        .vacancy
                        .as_ref()
                        .and_then(|v| v.employer.as_ref())
                        .and_then(|e| e.name.clone())
                        .unwrap_or_default(),
                    resume_title: item
                        .resume
                        .as_ref()
                        .and_then(|r| r.title.clone())
                        .unwrap_or_default(),
                    was_delivered: self.classifier.is_delivered(&status),
                    status,
                    applied_at: item.effective_timestamp().unwrap_or(started_at),
                };

                self.history.upsert_from_sync(&upsert).await?;
                records_upserted += 1;
            }

            page += 1;
        }

        self.profiles
            .set_sync_watermark(profile_name, started_at)
            .await?;

        info!(
            "Sync for {} complete: {} pages, {} records ({} skipped)",
            profile_name, page, records_upserted, records_skipped
        );

        Ok(SyncReport {
            started_at,
            pages_fetched: page,
            records_upserted,
            records_skipped,
            watermark: started_at,
        })
    }
}
