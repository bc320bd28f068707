//! Duplicate detection for saved attachments.
//!
//! A [`Deduplicator`] pairs the in-memory [`DuplicateCache`] with a durable
//! [`HashStore`]. The cache is consulted first; the store is only queried on a
//! cache miss, and a store hit warms the cache.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use archiver_core::dedup::{Deduplicator, DisabledHashStore, DuplicateCache, Verdict};
//!
//! # async fn example() {
//! let dedup = Deduplicator::new(DuplicateCache::new(100), Arc::new(DisabledHashStore));
//! let digest = "5eb63bbbe01eeed093cb22bb8f5acdc3";
//! assert_eq!(dedup.check_and_record("a.png", digest, 11).await, Verdict::Unique);
//! assert_eq!(dedup.check_and_record("b.png", digest, 11).await, Verdict::DuplicateInCache);
//! # }
//! ```

mod cache;
mod hasher;
mod store;

use std::sync::Arc;

use tracing::debug;

pub use cache::{DEFAULT_CACHE_CAPACITY, DuplicateCache};
pub use hasher::{ContentHasher, DIGEST_HEX_LEN, digest_file};
pub use store::{DisabledHashStore, HashRecord, HashStore, SqliteHashStore, open_hash_store};

/// Result of checking a digest against known content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Digest was not known; it has now been recorded in cache and store.
    Unique,
    /// Digest was found in the in-memory cache.
    DuplicateInCache,
    /// Digest was found in the durable store.
    DuplicateInStore,
}

impl Verdict {
    /// True for either duplicate variant.
    #[must_use]
    pub fn is_duplicate(self) -> bool {
        !matches!(self, Self::Unique)
    }
}

/// Cache-then-store duplicate gate shared by all download tasks.
pub struct Deduplicator {
    cache: DuplicateCache,
    store: Arc<dyn HashStore>,
}

impl std::fmt::Debug for Deduplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deduplicator")
            .field("cache_len", &self.cache.len())
            .field("cache_capacity", &self.cache.capacity())
            .field("store_enabled", &self.store.is_enabled())
            .finish()
    }
}

impl Deduplicator {
    /// Creates a deduplicator over the given cache and store.
    #[must_use]
    pub fn new(cache: DuplicateCache, store: Arc<dyn HashStore>) -> Self {
        Self { cache, store }
    }

    /// Checks `digest` and, when it is new, records it under `filename`.
    ///
    /// There is no transaction across cache and store; two tasks racing on the
    /// same new digest may both see [`Verdict::Unique`].
    pub async fn check_and_record(&self, filename: &str, digest: &str, size: u64) -> Verdict {
        if self.cache.lookup(digest) {
            return Verdict::DuplicateInCache;
        }

        if self.store.find_by_digest(digest).await {
            self.cache.insert(digest);
            return Verdict::DuplicateInStore;
        }

        self.cache.insert(digest);
        self.store.upsert_by_filename(filename, digest, size).await;
        debug!(%digest, filename, "recorded new digest");
        Verdict::Unique
    }

    /// The in-memory cache.
    #[must_use]
    pub fn cache(&self) -> &DuplicateCache {
        &self.cache
    }

    /// Whether a durable store backs this deduplicator.
    #[must_use]
    pub fn store_enabled(&self) -> bool {
        self.store.is_enabled()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::Database;

    const DIGEST: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

    #[tokio::test]
    async fn test_store_hit_warms_cache() {
        let store = SqliteHashStore::new(Database::new_in_memory().await.unwrap());
        store.upsert_by_filename("old.png", DIGEST, 11).await;

        let dedup = Deduplicator::new(DuplicateCache::new(8), Arc::new(store.clone()));

        assert_eq!(
            dedup.check_and_record("new.png", DIGEST, 11).await,
            Verdict::DuplicateInStore
        );
        assert!(dedup.cache().lookup(DIGEST));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unique_digest_recorded_in_both() {
        let store = SqliteHashStore::new(Database::new_in_memory().await.unwrap());
        let dedup = Deduplicator::new(DuplicateCache::new(8), Arc::new(store.clone()));

        let verdict = dedup.check_and_record("a.png", DIGEST, 11).await;

        assert_eq!(verdict, Verdict::Unique);
        assert!(!verdict.is_duplicate());
        assert!(dedup.cache().lookup(DIGEST));
        assert!(store.find_by_digest(DIGEST).await);
        assert!(dedup.store_enabled());
    }

    #[tokio::test]
    async fn test_store_remembers_after_cache_eviction() {
        let store = SqliteHashStore::new(Database::new_in_memory().await.unwrap());
        let dedup = Deduplicator::new(DuplicateCache::new(1), Arc::new(store));

        dedup.check_and_record("a.png", DIGEST, 11).await;
        dedup
            .check_and_record("b.png", "ffffffffffffffffffffffffffffffff", 3)
            .await;

        assert!(!dedup.cache().lookup(DIGEST));
        assert_eq!(
            dedup.check_and_record("c.png", DIGEST, 11).await,
            Verdict::DuplicateInStore
        );
    }
}
