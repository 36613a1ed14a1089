// src/core/database.rs
//! Database connection management, profile storage and app state.
//!
//! One SQLite file holds everything: authenticated profiles, the
//! app-state key/value table (active profile pointer, per-profile sync
//! watermarks), the JSON cache and the negotiation history. Migrations
//! are idempotent `CREATE TABLE IF NOT EXISTS` statements run on every
//! connect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

use crate::core::error::ClientError;

const ACTIVE_PROFILE_KEY: &str = "active_profile";
const SYNC_WATERMARK_PREFIX: &str = "last_negotiation_sync_";

// ===== Connection management =====

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database file and run migrations.
    pub async fn new(database_path: &Path) -> Result<Self, ClientError> {
        if let Some(parent) = database_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path.display());
        let pool = SqlitePool::connect(&database_url).await?;

        info!("Database connection established: {}", database_path.display());

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// In-memory database; single connection so every query sees the
    /// same memory store. Used by tests.
    pub async fn in_memory() -> Result<Self, ClientError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<(), ClientError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                profile_name TEXT PRIMARY KEY,
                remote_user_id TEXT UNIQUE NOT NULL,
                email TEXT NOT NULL DEFAULT '',
                access_token TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                kind TEXT NOT NULL,
                cache_key TEXT NOT NULL,
                payload TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                PRIMARY KEY (kind, cache_key)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS negotiation_history (
                profile_name TEXT NOT NULL,
                vacancy_id TEXT NOT NULL,
                resume_id TEXT NOT NULL DEFAULT '',
                vacancy_title TEXT NOT NULL DEFAULT '',
                employer_name TEXT NOT NULL DEFAULT '',
                resume_title TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT '',
                reason TEXT,
                was_delivered INTEGER NOT NULL DEFAULT 0,
                applied_at TEXT NOT NULL,
                PRIMARY KEY (profile_name, vacancy_id, resume_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_history_profile \
             ON negotiation_history(profile_name, applied_at);",
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations completed");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), ClientError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ===== Profile model =====

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub profile_name: String,
    pub remote_user_id: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

// ===== Profile repository =====

#[derive(Clone)]
pub struct ProfileRepository {
    pool: SqlitePool,
}

impl ProfileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert keyed by the remote user id. Re-authorizing an account
    /// that is already stored, possibly under another local name,
    /// updates that row in place instead of inserting a duplicate.
    pub async fn save_or_update(&self, profile: &Profile) -> Result<(), ClientError> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT profile_name FROM profiles WHERE remote_user_id = ?")
                .bind(&profile.remote_user_id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some((old_name,)) = existing {
            sqlx::query(
                r#"
                UPDATE profiles
                SET profile_name = ?, email = ?, access_token = ?, refresh_token = ?, expires_at = ?
                WHERE remote_user_id = ?
                "#,
            )
            .bind(&profile.profile_name)
            .bind(&profile.email)
            .bind(&profile.access_token)
            .bind(&profile.refresh_token)
            .bind(profile.expires_at)
            .bind(&profile.remote_user_id)
            .execute(&self.pool)
            .await?;

            if old_name != profile.profile_name {
                info!(
                    "Profile for remote user {} renamed: {} -> {}",
                    profile.remote_user_id, old_name, profile.profile_name
                );
            }
        } else {
            sqlx::query(
                r#"
                INSERT INTO profiles
                    (profile_name, remote_user_id, email, access_token, refresh_token, expires_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&profile.profile_name)
            .bind(&profile.remote_user_id)
            .bind(&profile.email)
            .bind(&profile.access_token)
            .bind(&profile.refresh_token)
            .bind(profile.expires_at)
            .execute(&self.pool)
            .await?;

            info!("Profile created: {}", profile.profile_name);
        }

        Ok(())
    }

    pub async fn load(&self, profile_name: &str) -> Result<Profile, ClientError> {
        sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE profile_name = ?")
            .bind(profile_name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ClientError::ProfileNotFound(profile_name.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Profile>, ClientError> {
        let profiles =
            sqlx::query_as::<_, Profile>("SELECT * FROM profiles ORDER BY profile_name ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(profiles)
    }

    pub async fn delete(&self, profile_name: &str) -> Result<bool, ClientError> {
        let result = sqlx::query("DELETE FROM profiles WHERE profile_name = ?")
            .bind(profile_name)
            .execute(&self.pool)
            .await?;

        if self.active_profile_name().await?.as_deref() == Some(profile_name) {
            sqlx::query("DELETE FROM app_state WHERE key = ?")
                .bind(ACTIVE_PROFILE_KEY)
                .execute(&self.pool)
                .await?;
        }

        Ok(result.rows_affected() > 0)
    }

    // ----- App state: active profile pointer -----

    pub async fn set_active_profile(&self, profile_name: &str) -> Result<(), ClientError> {
        self.set_state(ACTIVE_PROFILE_KEY, profile_name).await
    }

    pub async fn active_profile_name(&self) -> Result<Option<String>, ClientError> {
        self.get_state(ACTIVE_PROFILE_KEY).await
    }

    /// Resolve the persisted active profile to a full row.
    pub async fn active_profile(&self) -> Result<Profile, ClientError> {
        let name = self
            .active_profile_name()
            .await?
            .ok_or_else(|| ClientError::ProfileNotFound("<no active profile>".to_string()))?;
        self.load(&name).await
    }

    // ----- App state: sync watermarks -----

    pub async fn sync_watermark(
        &self,
        profile_name: &str,
    ) -> Result<Option<DateTime<Utc>>, ClientError> {
        let key = format!("{SYNC_WATERMARK_PREFIX}{profile_name}");
        match self.get_state(&key).await? {
            None => Ok(None),
            Some(raw) => {
                let parsed = DateTime::parse_from_rfc3339(&raw)
                    .map_err(|_| ClientError::InvalidResponse("malformed sync watermark"))?;
                Ok(Some(parsed.with_timezone(&Utc)))
            }
        }
    }

    pub async fn set_sync_watermark(
        &self,
        profile_name: &str,
        instant: DateTime<Utc>,
    ) -> Result<(), ClientError> {
        let key = format!("{SYNC_WATERMARK_PREFIX}{profile_name}");
        self.set_state(&key, &instant.to_rfc3339()).await
    }

    // ----- App state primitives -----

    async fn set_state(&self, key: &str, value: &str) -> Result<(), ClientError> {
        sqlx::query(
            r#"
            INSERT INTO app_state (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_state(&self, key: &str) -> Result<Option<String>, ClientError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM app_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn profile(name: &str, remote_id: &str) -> Profile {
        Profile {
            profile_name: name.to_string(),
            remote_user_id: remote_id.to_string(),
            email: "user@example.com".to_string(),
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let db = Database::in_memory().await.unwrap();
        let repo = ProfileRepository::new(db.pool().clone());

        repo.save_or_update(&profile("alice", "u-1")).await.unwrap();
        let loaded = repo.load("alice").await.unwrap();
        assert_eq!(loaded.remote_user_id, "u-1");
        assert_eq!(loaded.email, "user@example.com");
    }

    #[tokio::test]
    async fn load_missing_profile_is_not_found() {
        let db = Database::in_memory().await.unwrap();
        let repo = ProfileRepository::new(db.pool().clone());

        let err = repo.load("nobody").await.unwrap_err();
        assert!(matches!(err, ClientError::ProfileNotFound(_)));
    }

    #[tokio::test]
    async fn reauthorizing_same_remote_user_updates_in_place() {
        let db = Database::in_memory().await.unwrap();
        let repo = ProfileRepository::new(db.pool().clone());

        repo.save_or_update(&profile("alice", "u-1")).await.unwrap();
        repo.save_or_update(&profile("alice-new", "u-1")).await.unwrap();

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM profiles WHERE remote_user_id = 'u-1'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(count, 1);

        assert!(repo.load("alice").await.is_err());
        assert!(repo.load("alice-new").await.is_ok());
    }

    #[tokio::test]
    async fn active_profile_pointer_survives_updates() {
        let db = Database::in_memory().await.unwrap();
        let repo = ProfileRepository::new(db.pool().clone());

        repo.save_or_update(&profile("alice", "u-1")).await.unwrap();
        repo.set_active_profile("alice").await.unwrap();
        assert_eq!(repo.active_profile_name().await.unwrap().as_deref(), Some("alice"));

        let active = repo.active_profile().await.unwrap();
        assert_eq!(active.profile_name, "alice");
    }

    #[tokio::test]
    async fn deleting_active_profile_clears_pointer() {
        let db = Database::in_memory().await.unwrap();
        let repo = ProfileRepository::new(db.pool().clone());

        repo.save_or_update(&profile("alice", "u-1")).await.unwrap();
        repo.set_active_profile("alice").await.unwrap();
        assert!(repo.delete("alice").await.unwrap());
        assert_eq!(repo.active_profile_name().await.unwrap(), None);
    }

    #[tokio::test]
    async fn sync_watermark_roundtrip() {
        let db = Database::in_memory().await.unwrap();
        let repo = ProfileRepository::new(db.pool().clone());

        assert_eq!(repo.sync_watermark("alice").await.unwrap(), None);

        let instant = Utc::now();
        repo.set_sync_watermark("alice", instant).await.unwrap();
        let stored = repo.sync_watermark("alice").await.unwrap().unwrap();
        assert_eq!(stored.timestamp(), instant.timestamp());

        // Watermarks are per profile.
        assert_eq!(repo.sync_watermark("bob").await.unwrap(), None);
    }
}
