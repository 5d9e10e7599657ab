//! Tiered read-through cache with stale fallback.
//!
//! Three tiers are consulted in order:
//!
//! - **Memory (L1)**: a map in the process, lost on restart.
//! - **Durable (L2)**: any [`DurableStore`]; [`LmdbStore`] survives restarts,
//!   [`MemoryStore`] does not.
//! - **Remote (L3)**: a fetch closure supplied per read.
//!
//! Freshness is a TTL per entry, capped by a cache-wide `max_age`. When the
//! fetch fails, times out or is disabled, an expired durable entry is served
//! as [`CacheOutcome::StaleHit`] rather than nothing.
//!
//! # Durable Records
//!
//! Keys are written as `{namespace}:{key}` (see [`NamespacedKey`]) so several
//! caches, or unrelated data, can share one store. Values are JSON behind a
//! fixed binary header (see [`record`]).
//!
//! # Example
//!
//! ```ignore
//! let cache = TieredCache::new(CacheConfig::default(), Arc::new(LmdbStore::new(dir, 64)?))?;
//! let sweeper = cache.start_sweeper();
//!
//! let options = GetOptions::new().with_ttl(Duration::from_secs(600));
//! let skills: Vec<Skill> = cache.get_or_default("skills", || api.skills(), options).await;
//!
//! cache.disable_remote_fetch(); // offline: serve whatever is cached
//! ```

pub mod entry;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod namespaced_key;
pub mod outcome;
pub mod record;
pub mod stats;
pub mod sweeper;
pub mod tiered;
pub mod traits;

pub use entry::{CacheEntry, Origin};
pub use lmdb_backend::{LmdbStore, LmdbStoreError, LmdbStoreStats};
pub use memory_backend::MemoryStore;
pub use namespaced_key::{validate_key, NamespacedKey};
pub use outcome::{CacheOutcome, CacheRead, Tier};
pub use stats::{CacheMetrics, CacheStats, MetricsSnapshot, OriginBreakdown};
pub use sweeper::{SweepMetrics, SweepSnapshot, SweeperHandle};
pub use tiered::{GetOptions, TieredCache, TieredCacheBuilder};
pub use traits::DurableStore;
