// src/core/cache.rs
//! TTL-based JSON cache over the `cache_entries` table.
//!
//! Two flavors share the table: reference dictionaries keyed by name
//! and vacancy details keyed by id. The store itself is TTL-agnostic;
//! staleness is decided at read time by the caller-supplied TTL. A
//! failed fetch never writes an entry, so the next read retries
//! instead of serving a poisoned placeholder.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::debug;

use crate::core::error::ClientError;

/// Default time-to-live for both cache flavors.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Reference dictionaries: regions, roles, work formats.
    Dictionary,
    /// Full vacancy detail payloads.
    Vacancy,
}

impl CacheKind {
    fn as_str(self) -> &'static str {
        match self {
            CacheKind::Dictionary => "dictionary",
            CacheKind::Vacancy => "vacancy",
        }
    }
}

#[derive(Clone)]
pub struct CacheRepository {
    pool: SqlitePool,
}

impl CacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(
        &self,
        kind: CacheKind,
        key: &str,
    ) -> Result<Option<(Value, DateTime<Utc>)>, ClientError> {
        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT payload, captured_at FROM cache_entries WHERE kind = ? AND cache_key = ?",
        )
        .bind(kind.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some((payload, captured_at)) => {
                let value: Value = serde_json::from_str(&payload)?;
                Ok(Some((value, captured_at)))
            }
        }
    }

    pub async fn put(&self, kind: CacheKind, key: &str, payload: &Value) -> Result<(), ClientError> {
        self.put_at(kind, key, payload, Utc::now()).await
    }

    /// Insert with an explicit capture instant. Exposed so tests can
    /// plant aged entries; production code goes through [`put`].
    pub async fn put_at(
        &self,
        kind: CacheKind,
        key: &str,
        payload: &Value,
        captured_at: DateTime<Utc>,
    ) -> Result<(), ClientError> {
        let serialized = serde_json::to_string(payload)?;
        sqlx::query(
            r#"
            INSERT INTO cache_entries (kind, cache_key, payload, captured_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(kind, cache_key) DO UPDATE SET
                payload = excluded.payload,
                captured_at = excluded.captured_at
            "#,
        )
        .bind(kind.as_str())
        .bind(key)
        .bind(serialized)
        .bind(captured_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Read-through accessor: serve the cached payload while it is
    /// younger than `ttl`, otherwise run `fetcher` and overwrite the
    /// entry with a fresh capture timestamp.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        kind: CacheKind,
        key: &str,
        ttl: Duration,
        fetcher: F,
    ) -> Result<Value, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ClientError>>,
    {
        let now = Utc::now();
        if let Some((value, captured_at)) = self.get(kind, key).await? {
            let age = (now - captured_at).to_std().unwrap_or(Duration::ZERO);
            if age <= ttl {
                debug!("Cache hit: {}/{} (age {:?})", kind.as_str(), key, age);
                return Ok(value);
            }
            debug!("Cache stale: {}/{} (age {:?})", kind.as_str(), key, age);
        }

        let fresh = fetcher().await?;
        self.put(kind, key, &fresh).await?;
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::database::Database;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    async fn cache() -> (Database, CacheRepository) {
        let db = Database::in_memory().await.unwrap();
        let cache = CacheRepository::new(db.pool().clone());
        (db, cache)
    }

    #[tokio::test]
    async fn fresh_entry_is_served_without_fetching() {
        let (_db, cache) = cache().await;
        let captured = Utc::now() - ChronoDuration::days(6);
        cache
            .put_at(CacheKind::Vacancy, "v1", &json!({"id": "v1"}), captured)
            .await
            .unwrap();

        let fetched = std::sync::atomic::AtomicBool::new(false);
        let value = cache
            .get_or_fetch(CacheKind::Vacancy, "v1", DEFAULT_TTL, || async {
                fetched.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(json!({"id": "live"}))
            })
            .await
            .unwrap();
        assert_eq!(value["id"], "v1");
        assert!(!fetched.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stale_entry_triggers_refetch_and_overwrite() {
        let (_db, cache) = cache().await;
        let captured = Utc::now() - ChronoDuration::days(8);
        cache
            .put_at(CacheKind::Vacancy, "v1", &json!({"rev": 1}), captured)
            .await
            .unwrap();

        let value = cache
            .get_or_fetch(CacheKind::Vacancy, "v1", DEFAULT_TTL, || async {
                Ok(json!({"rev": 2}))
            })
            .await
            .unwrap();
        assert_eq!(value["rev"], 2);

        let (stored, captured_at) = cache.get(CacheKind::Vacancy, "v1").await.unwrap().unwrap();
        assert_eq!(stored["rev"], 2);
        assert!(Utc::now() - captured_at < ChronoDuration::minutes(1));
    }

    #[tokio::test]
    async fn miss_fetches_and_persists() {
        let (_db, cache) = cache().await;

        let value = cache
            .get_or_fetch(CacheKind::Dictionary, "main_dictionaries", DEFAULT_TTL, || async {
                Ok(json!({"areas": []}))
            })
            .await
            .unwrap();
        assert!(value["areas"].is_array());
        assert!(cache
            .get(CacheKind::Dictionary, "main_dictionaries")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn fetch_failure_writes_nothing() {
        let (_db, cache) = cache().await;

        let result = cache
            .get_or_fetch(CacheKind::Dictionary, "main_dictionaries", DEFAULT_TTL, || async {
                Err(ClientError::Api {
                    status: 503,
                    body: "unavailable".to_string(),
                })
            })
            .await;
        assert!(result.is_err());
        assert!(cache
            .get(CacheKind::Dictionary, "main_dictionaries")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn kinds_do_not_collide() {
        let (_db, cache) = cache().await;
        cache.put(CacheKind::Dictionary, "42", &json!("dict")).await.unwrap();
        cache.put(CacheKind::Vacancy, "42", &json!("vac")).await.unwrap();

        let (dict, _) = cache.get(CacheKind::Dictionary, "42").await.unwrap().unwrap();
        let (vac, _) = cache.get(CacheKind::Vacancy, "42").await.unwrap().unwrap();
        assert_eq!(dict, json!("dict"));
        assert_eq!(vac, json!("vac"));
    }
}
