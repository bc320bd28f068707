//! Bounded, recency-ordered set of known content digests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tracing::trace;

/// Default number of digests kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// In-memory LRU cache of digests that have already been stored.
///
/// Both [`lookup`](Self::lookup) hits and [`insert`](Self::insert) refresh a
/// digest's recency. When an insert pushes the size past capacity, the least
/// recently used digest is evicted. There is no age-based expiry.
///
/// Recency is tracked with a monotonically increasing stamp per digest plus a
/// queue of `(stamp, digest)` pairs. Refreshing a digest leaves its old queue
/// entry behind; stale entries are skipped during eviction and compacted once
/// the queue grows past twice the capacity, keeping both operations amortized
/// O(1).
#[derive(Debug)]
pub struct DuplicateCache {
    capacity: usize,
    inner: Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    stamps: HashMap<String, u64>,
    order: VecDeque<(u64, String)>,
    next_stamp: u64,
}

impl CacheState {
    fn touch(&mut self, digest: &str) {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.stamps.insert(digest.to_string(), stamp);
        self.order.push_back((stamp, digest.to_string()));
    }

    fn evict_oldest(&mut self) -> Option<String> {
        while let Some((stamp, digest)) = self.order.pop_front() {
            if self.stamps.get(&digest) == Some(&stamp) {
                self.stamps.remove(&digest);
                return Some(digest);
            }
        }
        None
    }

    fn compact(&mut self) {
        let stamps = &self.stamps;
        self.order
            .retain(|(stamp, digest)| stamps.get(digest) == Some(stamp));
    }
}

impl DuplicateCache {
    /// Creates an empty cache holding at most `capacity` digests (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheState::default()),
        }
    }

    /// Returns true if `digest` is present, refreshing its recency on a hit.
    pub fn lookup(&self, digest: &str) -> bool {
        let mut state = self.lock();
        if !state.stamps.contains_key(digest) {
            return false;
        }
        state.touch(digest);
        self.maybe_compact(&mut state);
        true
    }

    /// Records `digest` as the most recently used entry, evicting the least
    /// recently used one if capacity is exceeded.
    pub fn insert(&self, digest: &str) {
        let mut state = self.lock();
        state.touch(digest);
        while state.stamps.len() > self.capacity {
            if let Some(evicted) = state.evict_oldest() {
                trace!(digest = %evicted, "evicted digest from cache");
            } else {
                break;
            }
        }
        self.maybe_compact(&mut state);
    }

    /// Number of digests currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().stamps.len()
    }

    /// Returns true if no digests are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured maximum number of digests.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn maybe_compact(&self, state: &mut CacheState) {
        if state.order.len() > self.capacity.saturating_mul(2) {
            state.compact();
        }
    }

    // A panic while holding the lock cannot leave the maps half-updated in a
    // way that matters for a cache, so poisoning is ignored.
    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for DuplicateCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn digest(n: usize) -> String {
        format!("{n:032x}")
    }

    #[test]
    fn test_lookup_misses_on_empty_cache() {
        let cache = DuplicateCache::new(4);
        assert!(!cache.lookup(&digest(1)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lookup_hits_after_insert() {
        let cache = DuplicateCache::new(4);
        cache.insert(&digest(1));
        assert!(cache.lookup(&digest(1)));
        assert!(!cache.lookup(&digest(2)));
    }

    #[test]
    fn test_retains_most_recent_digests_beyond_capacity() {
        let cache = DuplicateCache::new(3);
        for n in 0..10 {
            cache.insert(&digest(n));
        }

        assert_eq!(cache.len(), 3);
        for n in 0..7 {
            assert!(!cache.lookup(&digest(n)), "digest {n} should be evicted");
        }
        for n in 7..10 {
            assert!(cache.lookup(&digest(n)), "digest {n} should be retained");
        }
    }

    #[test]
    fn test_reinsert_keeps_size_and_refreshes_recency() {
        let cache = DuplicateCache::new(3);
        cache.insert(&digest(1));
        cache.insert(&digest(2));
        cache.insert(&digest(3));

        cache.insert(&digest(1));
        assert_eq!(cache.len(), 3);

        cache.insert(&digest(4));
        assert!(cache.lookup(&digest(1)), "refreshed digest must survive");
        assert!(!cache.lookup(&digest(2)), "oldest untouched digest is evicted");
        assert!(cache.lookup(&digest(3)));
        assert!(cache.lookup(&digest(4)));
    }

    #[test]
    fn test_lookup_hit_refreshes_recency() {
        let cache = DuplicateCache::new(2);
        cache.insert(&digest(1));
        cache.insert(&digest(2));

        assert!(cache.lookup(&digest(1)));
        cache.insert(&digest(3));

        assert!(cache.lookup(&digest(1)));
        assert!(!cache.lookup(&digest(2)));
    }

    #[test]
    fn test_repeated_refreshes_stay_bounded() {
        let cache = DuplicateCache::new(2);
        cache.insert(&digest(1));
        cache.insert(&digest(2));
        for _ in 0..1_000 {
            cache.insert(&digest(1));
            assert!(cache.lookup(&digest(2)));
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.lock().order.len() <= 4 + 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped_to_one() {
        let cache = DuplicateCache::new(0);
        cache.insert(&digest(1));
        cache.insert(&digest(2));
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(&digest(2)));
    }

    #[test]
    fn test_concurrent_inserts_respect_capacity() {
        let cache = std::sync::Arc::new(DuplicateCache::new(50));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for n in 0..200 {
                        cache.insert(&digest(t * 1_000 + n));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 50);
    }
}
