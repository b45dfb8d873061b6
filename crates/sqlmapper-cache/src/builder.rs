//! Declarative cache configuration.

use crate::cache::{Cache, PerpetualCache};
use crate::decorators::{CopyOnReadCache, LoggingCache, ScheduledCache, SharedCache, SynchronizedCache};
use crate::eviction::{DEFAULT_SIZE, FifoCache, LruCache, SoftCache, WeakCache};
use serde::Deserialize;
use std::time::Duration;

/// Eviction policy of a second-level cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eviction {
    #[default]
    Lru,
    Fifo,
    Soft,
    Weak,
}

/// Cache declaration for one statement group.
///
/// ```json
/// { "eviction": "fifo", "size": 512, "flush_interval_ms": 60000, "read_only": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub eviction: Eviction,
    pub size: Option<usize>,
    pub flush_interval_ms: Option<u64>,
    /// Read-only caches hand out the shared result; read-write caches copy.
    pub read_only: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            eviction: Eviction::Lru,
            size: None,
            flush_interval_ms: None,
            read_only: true,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eviction(mut self, eviction: Eviction) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = Some(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Build the decorated, shareable cache for namespace `id`.
    pub fn build(&self, id: &str) -> SharedCache {
        let size = self.size.unwrap_or(DEFAULT_SIZE);
        let mut cache: Box<dyn Cache> = match self.eviction {
            Eviction::Lru => Box::new(LruCache::with_size(Box::new(PerpetualCache::new(id)), size)),
            Eviction::Fifo => Box::new(FifoCache::with_size(Box::new(PerpetualCache::new(id)), size)),
            Eviction::Soft => Box::new(SoftCache::new(id)),
            Eviction::Weak => Box::new(WeakCache::new(id)),
        };
        if let Some(ms) = self.flush_interval_ms {
            cache = Box::new(ScheduledCache::new(cache, Duration::from_millis(ms)));
        }
        if !self.read_only {
            cache = Box::new(CopyOnReadCache::new(cache));
        }
        cache = Box::new(LoggingCache::new(cache));
        tracing::debug!(cache = id, eviction = ?self.eviction, size, "built second-level cache");
        SynchronizedCache::shared(cache)
    }
}
