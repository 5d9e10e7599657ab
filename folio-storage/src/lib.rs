//! Folio Storage - Tiered Cache
//!
//! Memory, durable and remote tiers behind a single read-through API.
//! Configuration and errors live in folio-core.

pub mod cache;

pub use cache::{
    CacheEntry, CacheOutcome, CacheRead, CacheStats, DurableStore, GetOptions, LmdbStore,
    LmdbStoreError, MemoryStore, NamespacedKey, Origin, SweeperHandle, Tier, TieredCache,
    TieredCacheBuilder,
};
