//! Transaction-scoped staging in front of shared caches.
//!
//! Writes made inside a session become visible to other sessions only when
//! the session commits. A clear requested inside the transaction hides the
//! shared contents from this session immediately and is applied to the
//! shared cache on commit.

use crate::cache::CachedResult;
use crate::decorators::SharedCache;
use crate::key::CacheKey;
use std::collections::HashMap;
use std::sync::Arc;

/// Staging buffer for one shared cache.
#[derive(Debug)]
pub struct TransactionalCache {
    delegate: SharedCache,
    clear_on_commit: bool,
    entries_to_add_on_commit: HashMap<CacheKey, CachedResult>,
}

impl TransactionalCache {
    pub fn new(delegate: SharedCache) -> Self {
        Self {
            delegate,
            clear_on_commit: false,
            entries_to_add_on_commit: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.delegate.id()
    }

    /// Read committed state. Nothing is visible after a pending clear.
    pub fn get(&self, key: &CacheKey) -> Option<CachedResult> {
        let value = self.delegate.get(key);
        if self.clear_on_commit { None } else { value }
    }

    /// Stage a write until commit.
    pub fn put(&mut self, key: CacheKey, value: CachedResult) {
        self.entries_to_add_on_commit.insert(key, value);
    }

    /// Request a clear on commit and drop staged writes.
    pub fn clear(&mut self) {
        self.clear_on_commit = true;
        self.entries_to_add_on_commit.clear();
    }

    pub fn has_pending(&self) -> bool {
        self.clear_on_commit || !self.entries_to_add_on_commit.is_empty()
    }

    pub fn commit(&mut self) {
        if self.clear_on_commit {
            self.delegate.clear();
        }
        let staged = self.entries_to_add_on_commit.len();
        for (key, value) in self.entries_to_add_on_commit.drain() {
            self.delegate.put(key, value);
        }
        if staged > 0 {
            tracing::trace!(cache = %self.delegate.id(), staged, "published staged cache entries");
        }
        self.clear_on_commit = false;
    }

    pub fn rollback(&mut self) {
        self.clear_on_commit = false;
        self.entries_to_add_on_commit.clear();
    }
}

/// One `TransactionalCache` per shared cache touched by a session.
#[derive(Debug, Default)]
pub struct TransactionalCacheManager {
    caches: HashMap<String, TransactionalCache>,
}

impl TransactionalCacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn staging(&mut self, cache: &SharedCache) -> &mut TransactionalCache {
        self.caches
            .entry(cache.id().to_string())
            .or_insert_with(|| TransactionalCache::new(Arc::clone(cache)))
    }

    pub fn clear(&mut self, cache: &SharedCache) {
        self.staging(cache).clear();
    }

    pub fn get_object(&mut self, cache: &SharedCache, key: &CacheKey) -> Option<CachedResult> {
        self.staging(cache).get(key)
    }

    pub fn put_object(&mut self, cache: &SharedCache, key: CacheKey, value: CachedResult) {
        self.staging(cache).put(key, value);
    }

    pub fn commit(&mut self) {
        for cache in self.caches.values_mut() {
            cache.commit();
        }
    }

    pub fn rollback(&mut self) {
        for cache in self.caches.values_mut() {
            cache.rollback();
        }
    }

    /// Is anything staged that a commit would publish?
    pub fn has_pending(&self) -> bool {
        self.caches.values().any(TransactionalCache::has_pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CacheConfig;
    use sqlmapper_core::Object;

    fn rows(n: i64) -> CachedResult {
        Arc::new(vec![Object::from(n)])
    }

    #[test]
    fn staged_writes_publish_on_commit() {
        let shared = CacheConfig::new().build("users");
        let key = CacheKey::from_values(["users.all"]);

        let mut a = TransactionalCacheManager::new();
        let mut b = TransactionalCacheManager::new();
        a.put_object(&shared, key.clone(), rows(1));
        assert!(a.has_pending());
        assert!(b.get_object(&shared, &key).is_none());
        assert!(a.get_object(&shared, &key).is_none());

        a.commit();
        assert!(!a.has_pending());
        assert!(b.get_object(&shared, &key).is_some());
    }

    #[test]
    fn rollback_discards_staged_writes() {
        let shared = CacheConfig::new().build("users");
        let key = CacheKey::from_values(["users.all"]);
        let mut tx = TransactionalCacheManager::new();
        tx.put_object(&shared, key.clone(), rows(1));
        tx.rollback();
        tx.commit();
        assert_eq!(shared.size(), 0);
    }

    #[test]
    fn pending_clear_hides_committed_entries() {
        let shared = CacheConfig::new().build("users");
        let key = CacheKey::from_values(["users.all"]);
        shared.put(key.clone(), rows(1));

        let mut writer = TransactionalCacheManager::new();
        let mut reader = TransactionalCacheManager::new();
        writer.clear(&shared);
        assert!(writer.get_object(&shared, &key).is_none());
        assert!(reader.get_object(&shared, &key).is_some());

        writer.commit();
        assert!(reader.get_object(&shared, &key).is_none());
    }
}
