//! Read-through cache in front of an [`EnrollmentStore`].
//!
//! Handlers read through the cache and write straight to the store; the
//! dispatcher clears the cache after every successful operation through the
//! [`CacheInvalidator`] impl.

use std::sync::Arc;

use opfactory_core::CacheInvalidator;
use quick_cache::sync::Cache;
use tracing::debug;

use super::enrollment_store::{Enrollment, EnrollmentKey, EnrollmentStore};

/// Caches lookups, including misses, keyed by [`EnrollmentKey`].
pub struct EnrollmentCache {
    store: Arc<dyn EnrollmentStore>,
    entries: Cache<EnrollmentKey, Option<Enrollment>>,
}

impl EnrollmentCache {
    /// Creates a cache holding at most `capacity` lookups (minimum 1).
    #[must_use]
    pub fn new(store: Arc<dyn EnrollmentStore>, capacity: usize) -> Self {
        Self {
            store,
            entries: Cache::new(capacity.max(1)),
        }
    }

    /// Returns the record for `key`, loading it from the store on a miss.
    #[must_use]
    pub fn get(&self, key: &EnrollmentKey) -> Option<Enrollment> {
        if let Some(cached) = self.entries.get(key) {
            return cached;
        }
        let loaded = self.store.get(key);
        self.entries.insert(*key, loaded.clone());
        loaded
    }

    /// Number of cached lookups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }
}

impl CacheInvalidator for EnrollmentCache {
    fn invalidate(&self) -> anyhow::Result<()> {
        let dropped = self.entries.len();
        self.entries.clear();
        debug!(dropped, "enrollment cache flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::enrollment_store::{EnrollmentStatus, MemoryEnrollmentStore};

    fn setup() -> (Arc<MemoryEnrollmentStore>, EnrollmentCache) {
        let store = Arc::new(MemoryEnrollmentStore::new());
        let cache = EnrollmentCache::new(store.clone(), 16);
        (store, cache)
    }

    #[test]
    fn serves_stale_value_until_invalidated() {
        let (store, cache) = setup();
        let key = EnrollmentKey::new(1, 9);

        assert!(cache.get(&key).is_none());
        store
            .insert(Enrollment::new(key, EnrollmentStatus::Enrolled, None))
            .unwrap();
        // Cached miss still answers.
        assert!(cache.get(&key).is_none());

        cache.invalidate().unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&key).unwrap().status, EnrollmentStatus::Enrolled);
    }

    #[test]
    fn caches_hits() {
        let (store, cache) = setup();
        let key = EnrollmentKey::new(2, 3);
        store
            .insert(Enrollment::new(key, EnrollmentStatus::Waitlisted, None))
            .unwrap();

        assert!(cache.get(&key).is_some());
        store.remove(&key).unwrap();
        assert!(cache.get(&key).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let store = Arc::new(MemoryEnrollmentStore::new());
        let cache = EnrollmentCache::new(store, 0);
        assert!(cache.get(&EnrollmentKey::new(1, 1)).is_none());
    }
}
