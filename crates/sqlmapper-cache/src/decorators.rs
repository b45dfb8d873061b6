//! Behavioural layers: scheduled clearing, copy-on-read, hit logging and
//! thread-safe sharing.

use crate::cache::{Cache, CachedResult};
use crate::key::CacheKey;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clears the whole cache once `interval` has passed since the last clear.
#[derive(Debug)]
pub struct ScheduledCache {
    delegate: Box<dyn Cache>,
    interval: Duration,
    last_clear: Instant,
}

impl ScheduledCache {
    pub fn new(delegate: Box<dyn Cache>, interval: Duration) -> Self {
        Self {
            delegate,
            interval,
            last_clear: Instant::now(),
        }
    }

    fn clear_when_stale(&mut self) -> bool {
        if self.last_clear.elapsed() >= self.interval {
            self.clear();
            true
        } else {
            false
        }
    }
}

impl Cache for ScheduledCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&mut self, key: CacheKey, value: CachedResult) {
        self.clear_when_stale();
        self.delegate.put(key, value);
    }

    fn get(&mut self, key: &CacheKey) -> Option<CachedResult> {
        if self.clear_when_stale() {
            None
        } else {
            self.delegate.get(key)
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CachedResult> {
        self.clear_when_stale();
        self.delegate.remove(key)
    }

    fn clear(&mut self) {
        self.last_clear = Instant::now();
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }
}

/// Hands every reader its own copy of a cached result.
///
/// Used for read-write caches, where callers may mutate what they get back.
#[derive(Debug)]
pub struct CopyOnReadCache {
    delegate: Box<dyn Cache>,
}

impl CopyOnReadCache {
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self { delegate }
    }
}

impl Cache for CopyOnReadCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&mut self, key: CacheKey, value: CachedResult) {
        self.delegate.put(key, value);
    }

    fn get(&mut self, key: &CacheKey) -> Option<CachedResult> {
        self.delegate.get(key).map(|v| Arc::new(v.as_ref().clone()))
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CachedResult> {
        self.delegate.remove(key)
    }

    fn clear(&mut self) {
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }
}

/// Counts requests and hits and reports the ratio.
#[derive(Debug)]
pub struct LoggingCache {
    delegate: Box<dyn Cache>,
    requests: u64,
    hits: u64,
}

impl LoggingCache {
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self {
            delegate,
            requests: 0,
            hits: 0,
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }
}

impl Cache for LoggingCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&mut self, key: CacheKey, value: CachedResult) {
        self.delegate.put(key, value);
    }

    fn get(&mut self, key: &CacheKey) -> Option<CachedResult> {
        self.requests += 1;
        let value = self.delegate.get(key);
        if value.is_some() {
            self.hits += 1;
        }
        tracing::debug!(
            cache = %self.delegate.id(),
            hit_ratio = self.hit_ratio(),
            "Cache Hit Ratio"
        );
        value
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CachedResult> {
        self.delegate.remove(key)
    }

    fn clear(&mut self) {
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }
}

/// A cache stack shared between sessions.
pub type SharedCache = Arc<SynchronizedCache>;

/// Serializes access to a cache stack.
#[derive(Debug)]
pub struct SynchronizedCache {
    id: String,
    inner: Mutex<Box<dyn Cache>>,
}

impl SynchronizedCache {
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self {
            id: delegate.id().to_string(),
            inner: Mutex::new(delegate),
        }
    }

    pub fn shared(delegate: Box<dyn Cache>) -> SharedCache {
        Arc::new(Self::new(delegate))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn put(&self, key: CacheKey, value: CachedResult) {
        self.inner.lock().put(key, value);
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedResult> {
        self.inner.lock().get(key)
    }

    pub fn remove(&self, key: &CacheKey) -> Option<CachedResult> {
        self.inner.lock().remove(key)
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn size(&self) -> usize {
        self.inner.lock().size()
    }
}
