//! Caching for SQLMapper Rust.
//!
//! - `CacheKey`: the composite key every query result is stored under
//! - `Cache` and its layers: base storage, eviction, scheduled clear,
//!   copy-on-read, hit logging, and the thread-safe `SynchronizedCache`
//! - `CacheConfig`: serde-deserializable cache declaration that builds a
//!   decorated `SharedCache`
//! - `TransactionalCacheManager`: per-session staging that publishes writes
//!   only on commit

pub mod builder;
pub mod cache;
pub mod decorators;
pub mod eviction;
pub mod key;
pub mod transactional;

pub use builder::{CacheConfig, Eviction};
pub use cache::{Cache, CachedResult, PerpetualCache};
pub use decorators::{
    CopyOnReadCache, LoggingCache, ScheduledCache, SharedCache, SynchronizedCache,
};
pub use eviction::{FifoCache, LruCache, SoftCache, WeakCache};
pub use key::CacheKey;
pub use transactional::{TransactionalCache, TransactionalCacheManager};
