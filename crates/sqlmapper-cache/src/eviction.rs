//! Eviction policies.
//!
//! `FifoCache` and `LruCache` wrap another layer and remove its entries once
//! a size bound is reached. `SoftCache` and `WeakCache` are storage layers
//! of their own: they hold weak references, so an entry lives only while
//! some session (or the soft cache's hard-link window) still holds it.

use crate::cache::{Cache, CachedResult};
use crate::key::CacheKey;
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};

pub const DEFAULT_SIZE: usize = 1024;
pub const DEFAULT_HARD_LINKS: usize = 256;

/// First in, first out.
#[derive(Debug)]
pub struct FifoCache {
    delegate: Box<dyn Cache>,
    keys: VecDeque<CacheKey>,
    size: usize,
}

impl FifoCache {
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self::with_size(delegate, DEFAULT_SIZE)
    }

    pub fn with_size(delegate: Box<dyn Cache>, size: usize) -> Self {
        Self {
            delegate,
            keys: VecDeque::new(),
            size: size.max(1),
        }
    }
}

impl Cache for FifoCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&mut self, key: CacheKey, value: CachedResult) {
        if !self.keys.contains(&key) {
            self.keys.push_back(key.clone());
            if self.keys.len() > self.size {
                if let Some(oldest) = self.keys.pop_front() {
                    self.delegate.remove(&oldest);
                }
            }
        }
        self.delegate.put(key, value);
    }

    fn get(&mut self, key: &CacheKey) -> Option<CachedResult> {
        self.delegate.get(key)
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CachedResult> {
        self.keys.retain(|k| k != key);
        self.delegate.remove(key)
    }

    fn clear(&mut self) {
        self.delegate.clear();
        self.keys.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }
}

/// Least recently used.
#[derive(Debug)]
pub struct LruCache {
    delegate: Box<dyn Cache>,
    keys: lru::LruCache<CacheKey, ()>,
}

impl LruCache {
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self::with_size(delegate, DEFAULT_SIZE)
    }

    pub fn with_size(delegate: Box<dyn Cache>, size: usize) -> Self {
        let capacity = NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN);
        Self {
            delegate,
            keys: lru::LruCache::new(capacity),
        }
    }
}

impl Cache for LruCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&mut self, key: CacheKey, value: CachedResult) {
        if let Some((evicted, ())) = self.keys.push(key.clone(), ()) {
            if evicted != key {
                self.delegate.remove(&evicted);
            }
        }
        self.delegate.put(key, value);
    }

    fn get(&mut self, key: &CacheKey) -> Option<CachedResult> {
        self.keys.get(key);
        self.delegate.get(key)
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CachedResult> {
        self.keys.pop(key);
        self.delegate.remove(key)
    }

    fn clear(&mut self) {
        self.delegate.clear();
        self.keys.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }
}

/// Weak entries plus a window of recently used results kept alive.
#[derive(Debug)]
pub struct SoftCache {
    id: String,
    entries: HashMap<CacheKey, Weak<Vec<sqlmapper_core::Object>>>,
    hard_links: VecDeque<CachedResult>,
    hard_links_size: usize,
}

impl SoftCache {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_hard_links(id, DEFAULT_HARD_LINKS)
    }

    pub fn with_hard_links(id: impl Into<String>, hard_links_size: usize) -> Self {
        Self {
            id: id.into(),
            entries: HashMap::new(),
            hard_links: VecDeque::new(),
            hard_links_size,
        }
    }

    fn hold(&mut self, value: &CachedResult) {
        if self.hard_links_size == 0 {
            return;
        }
        self.hard_links.push_front(Arc::clone(value));
        if self.hard_links.len() > self.hard_links_size {
            self.hard_links.pop_back();
        }
    }

    fn remove_collected(&mut self) {
        self.entries.retain(|_, weak| weak.strong_count() > 0);
    }
}

impl Cache for SoftCache {
    fn id(&self) -> &str {
        &self.id
    }

    fn put(&mut self, key: CacheKey, value: CachedResult) {
        self.remove_collected();
        self.hold(&value);
        self.entries.insert(key, Arc::downgrade(&value));
    }

    fn get(&mut self, key: &CacheKey) -> Option<CachedResult> {
        let value = self.entries.get(key)?.upgrade();
        match value {
            Some(value) => {
                self.hold(&value);
                Some(value)
            }
            None => {
                self.entries.remove(key);
                None
            }
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CachedResult> {
        self.remove_collected();
        self.entries.remove(key).and_then(|w| w.upgrade())
    }

    fn clear(&mut self) {
        self.hard_links.clear();
        self.entries.clear();
    }

    fn size(&self) -> usize {
        self.entries
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// Weak entries only.
#[derive(Debug)]
pub struct WeakCache {
    inner: SoftCache,
}

impl WeakCache {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: SoftCache::with_hard_links(id, 0),
        }
    }
}

impl Cache for WeakCache {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn put(&mut self, key: CacheKey, value: CachedResult) {
        self.inner.put(key, value);
    }

    fn get(&mut self, key: &CacheKey) -> Option<CachedResult> {
        self.inner.get(key)
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CachedResult> {
        self.inner.remove(key)
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn size(&self) -> usize {
        self.inner.size()
    }
}
