// src/core/history.rs
//! Negotiation history persistence.
//!
//! One row per (profile, vacancy, resume). Sync upserts overwrite the
//! descriptive fields but obey two invariants: `applied_at` never
//! moves backwards and `was_delivered` stays true once set. `reason`
//! belongs to the apply path alone; sync never touches it.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::core::classifier::ClassifiedRecord;
use crate::core::error::ClientError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoryRecord {
    pub profile_name: String,
    pub vacancy_id: String,
    pub resume_id: String,
    pub vacancy_title: String,
    pub employer_name: String,
    pub resume_title: String,
    pub status: String,
    pub reason: Option<String>,
    pub was_delivered: bool,
    pub applied_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn as_classified(&self) -> ClassifiedRecord {
        ClassifiedRecord {
            vacancy_id: self.vacancy_id.clone(),
            vacancy_title: self.vacancy_title.clone(),
            employer_name: self.employer_name.clone(),
            status: self.status.clone(),
            applied_at: self.applied_at,
        }
    }
}

/// Fields a sync upsert is allowed to write.
#[derive(Debug, Clone)]
pub struct SyncUpsert {
    pub profile_name: String,
    pub vacancy_id: String,
    pub resume_id: String,
    pub vacancy_title: String,
    pub employer_name: String,
    pub resume_title: String,
    pub status: String,
    pub was_delivered: bool,
    pub applied_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct HistoryRepository {
    pool: SqlitePool,
}

impl HistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert from the sync engine. Read-merge-write keeps
    /// the invariants explicit: delivered is OR-ed with the stored bit,
    /// the newer `applied_at` wins, and `reason` is carried over
    /// unchanged.
    pub async fn upsert_from_sync(&self, upsert: &SyncUpsert) -> Result<(), ClientError> {
        let existing = self
            .get(&upsert.profile_name, &upsert.vacancy_id, &upsert.resume_id)
            .await?;

        let (was_delivered, applied_at, reason) = match &existing {
            Some(row) => (
                row.was_delivered || upsert.was_delivered,
                row.applied_at.max(upsert.applied_at),
                row.reason.clone(),
            ),
            None => (upsert.was_delivered, upsert.applied_at, None),
        };

        sqlx::query(
            r#"
            INSERT INTO negotiation_history
                (profile_name, vacancy_id, resume_id, vacancy_title, employer_name,
                 resume_title, status, reason, was_delivered, applied_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(profile_name, vacancy_id, resume_id) DO UPDATE SET
                vacancy_title = excluded.vacancy_title,
                employer_name = excluded.employer_name,
                resume_title = excluded.resume_title,
                status = excluded.status,
                reason = excluded.reason,
                was_delivered = excluded.was_delivered,
                applied_at = excluded.applied_at
            "#,
        )
        .bind(&upsert.profile_name)
        .bind(&upsert.vacancy_id)
        .bind(&upsert.resume_id)
        .bind(&upsert.vacancy_title)
        .bind(&upsert.employer_name)
        .bind(&upsert.resume_title)
        .bind(&upsert.status)
        .bind(&reason)
        .bind(was_delivered)
        .bind(applied_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record the outcome of an apply action. This is the only writer
    /// of `reason`. A successful apply marks the pair delivered; a
    /// failed one records the reason but never clears an earlier
    /// delivered bit.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_apply(
        &self,
        profile_name: &str,
        vacancy_id: &str,
        resume_id: &str,
        resume_title: &str,
        vacancy_title: &str,
        employer_name: &str,
        status: &str,
        reason: Option<&str>,
    ) -> Result<(), ClientError> {
        let existing = self.get(profile_name, vacancy_id, resume_id).await?;
        let delivered_now = status == "applied";
        let was_delivered =
            delivered_now || existing.as_ref().map(|r| r.was_delivered).unwrap_or(false);
        let applied_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO negotiation_history
                (profile_name, vacancy_id, resume_id, vacancy_title, employer_name,
                 resume_title, status, reason, was_delivered, applied_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(profile_name, vacancy_id, resume_id) DO UPDATE SET
                vacancy_title = excluded.vacancy_title,
                employer_name = excluded.employer_name,
                resume_title = excluded.resume_title,
                status = excluded.status,
                reason = excluded.reason,
                was_delivered = excluded.was_delivered,
                applied_at = excluded.applied_at
            "#,
        )
        .bind(profile_name)
        .bind(vacancy_id)
        .bind(resume_id)
        .bind(vacancy_title)
        .bind(employer_name)
        .bind(resume_title)
        .bind(status)
        .bind(reason)
        .bind(was_delivered)
        .bind(applied_at)
        .execute(&self.pool)
        .await?;

        debug!(
            "Apply recorded: profile={} vacancy={} status={}",
            profile_name, vacancy_id, status
        );
        Ok(())
    }

    pub async fn get(
        &self,
        profile_name: &str,
        vacancy_id: &str,
        resume_id: &str,
    ) -> Result<Option<HistoryRecord>, ClientError> {
        let record = sqlx::query_as::<_, HistoryRecord>(
            r#"
            SELECT * FROM negotiation_history
            WHERE profile_name = ? AND vacancy_id = ? AND resume_id = ?
            "#,
        )
        .bind(profile_name)
        .bind(vacancy_id)
        .bind(resume_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Everything the profile has ever applied to, newest first.
    pub async fn full_history(&self, profile_name: &str) -> Result<Vec<HistoryRecord>, ClientError> {
        let records = sqlx::query_as::<_, HistoryRecord>(
            r#"
            SELECT * FROM negotiation_history
            WHERE profile_name = ?
            ORDER BY applied_at DESC
            "#,
        )
        .bind(profile_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn history_for_resume(
        &self,
        profile_name: &str,
        resume_id: &str,
    ) -> Result<Vec<HistoryRecord>, ClientError> {
        let records = sqlx::query_as::<_, HistoryRecord>(
            r#"
            SELECT * FROM negotiation_history
            WHERE profile_name = ? AND resume_id = ?
            ORDER BY applied_at DESC
            "#,
        )
        .bind(profile_name)
        .bind(resume_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
