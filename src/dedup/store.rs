//! Durable record of known digests, keyed by saved filename.
//!
//! The store is optional. [`open_hash_store`] picks an implementation once at
//! startup: a [`SqliteHashStore`] when a connection string is configured and
//! reachable, otherwise a [`DisabledHashStore`] for the rest of the process
//! lifetime. Callers only ever see the [`HashStore`] trait, and neither
//! implementation surfaces errors: a failed query reads as "not found".

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::db::{Database, DbError};

/// A persisted digest row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct HashRecord {
    /// Saved filename (unique key).
    pub filename: String,
    /// 32-character lowercase hex digest.
    pub digest: String,
    /// File size in bytes.
    pub size: i64,
    /// RFC 3339 time the row was last written.
    pub recorded_at: String,
}

/// Data-access contract for durable duplicate detection.
#[async_trait]
pub trait HashStore: Send + Sync {
    /// Returns true if any stored file has this digest.
    async fn find_by_digest(&self, digest: &str) -> bool;

    /// Inserts or replaces the row for `filename`.
    async fn upsert_by_filename(&self, filename: &str, digest: &str, size: u64);

    /// Whether this store persists anything.
    fn is_enabled(&self) -> bool;
}

/// Store used when no database is configured or it failed to initialize.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledHashStore;

#[async_trait]
impl HashStore for DisabledHashStore {
    async fn find_by_digest(&self, _digest: &str) -> bool {
        false
    }

    async fn upsert_by_filename(&self, _filename: &str, _digest: &str, _size: u64) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

/// SQLite-backed digest store.
#[derive(Debug, Clone)]
pub struct SqliteHashStore {
    db: Database,
}

impl SqliteHashStore {
    /// Wraps an already migrated database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Number of rows currently stored.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the query fails.
    pub async fn count(&self) -> Result<i64, DbError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM file_hashes")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    /// Fetches the row for `filename`, if any.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the query fails.
    pub async fn get(&self, filename: &str) -> Result<Option<HashRecord>, DbError> {
        let record = sqlx::query_as::<_, HashRecord>(
            "SELECT filename, digest, size, recorded_at FROM file_hashes WHERE filename = ?",
        )
        .bind(filename)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(record)
    }
}

#[async_trait]
impl HashStore for SqliteHashStore {
    #[instrument(level = "debug", skip(self))]
    async fn find_by_digest(&self, digest: &str) -> bool {
        let result: Result<Option<(i64,)>, sqlx::Error> =
            sqlx::query_as("SELECT 1 FROM file_hashes WHERE digest = ? LIMIT 1")
                .bind(digest)
                .fetch_optional(self.db.pool())
                .await;

        match result {
            Ok(row) => row.is_some(),
            Err(error) => {
                warn!(%error, "hash store lookup failed, treating as not found");
                false
            }
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn upsert_by_filename(&self, filename: &str, digest: &str, size: u64) {
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        let recorded_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let result = sqlx::query(
            "INSERT INTO file_hashes (filename, digest, size, recorded_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(filename) DO UPDATE SET \
                 digest = excluded.digest, \
                 size = excluded.size, \
                 recorded_at = excluded.recorded_at",
        )
        .bind(filename)
        .bind(digest)
        .bind(size)
        .bind(&recorded_at)
        .execute(self.db.pool())
        .await;

        match result {
            Ok(_) => debug!("recorded digest"),
            Err(error) => warn!(%error, "failed to record digest in hash store"),
        }
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Selects the store implementation for this process.
///
/// With no URL, or when connecting or migrating fails, the returned store is
/// permanently disabled. Connection is never retried.
pub async fn open_hash_store(url: Option<&str>) -> Arc<dyn HashStore> {
    let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
        info!("no database configured, duplicate detection is cache-only");
        return Arc::new(DisabledHashStore);
    };

    match Database::connect(url).await {
        Ok(db) => {
            let store = SqliteHashStore::new(db);
            match store.count().await {
                Ok(count) => info!(records = count, "hash store ready"),
                Err(error) => warn!(%error, "hash store ready but row count failed"),
            }
            Arc::new(store)
        }
        Err(error) => {
            warn!(%error, "hash store unavailable, duplicate detection is cache-only");
            Arc::new(DisabledHashStore)
        }
    }
}
