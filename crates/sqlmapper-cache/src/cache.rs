//! The cache contract and its base storage.

use crate::key::CacheKey;
use sqlmapper_core::Object;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A cached query result. Shared immutably between sessions.
pub type CachedResult = Arc<Vec<Object>>;

/// A second-level cache layer.
///
/// Layers are single-threaded; share a stack through `SynchronizedCache`.
pub trait Cache: Send + fmt::Debug {
    /// Namespace this cache belongs to.
    fn id(&self) -> &str;

    fn put(&mut self, key: CacheKey, value: CachedResult);

    fn get(&mut self, key: &CacheKey) -> Option<CachedResult>;

    fn remove(&mut self, key: &CacheKey) -> Option<CachedResult>;

    fn clear(&mut self);

    fn size(&self) -> usize;
}

/// Unbounded map storage at the bottom of every decorator stack.
#[derive(Debug)]
pub struct PerpetualCache {
    id: String,
    entries: HashMap<CacheKey, CachedResult>,
}

impl PerpetualCache {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: HashMap::new(),
        }
    }
}

impl Cache for PerpetualCache {
    fn id(&self) -> &str {
        &self.id
    }

    fn put(&mut self, key: CacheKey, value: CachedResult) {
        self.entries.insert(key, value);
    }

    fn get(&mut self, key: &CacheKey) -> Option<CachedResult> {
        self.entries.get(key).cloned()
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CachedResult> {
        self.entries.remove(key)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn size(&self) -> usize {
        self.entries.len()
    }
}
