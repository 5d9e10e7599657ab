//! Tiered read-through cache.
//!
//! Reads go memory (L1) -> durable store (L2) -> caller-supplied fetch (L3).
//! A valid L2 entry is promoted into L1. A successful fetch populates both
//! tiers. When the fetch fails, times out or is disabled, an expired L2
//! entry is served as a stale fallback before giving up.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex as StdMutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::time::Duration;

use folio_core::{CacheConfig, Clock, FetchError, FolioResult, SystemClock, ValidationError};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, Origin};
use super::namespaced_key::NamespacedKey;
use super::outcome::{CacheOutcome, CacheRead, Tier};
use super::record;
use super::stats::{CacheMetrics, CacheStats};
use super::traits::DurableStore;

/// A fetch shared by every caller that missed on the same key, tagged with
/// the generation that started it.
type InFlightFetch = (u64, Shared<BoxFuture<'static, Result<CacheEntry<Value>, FetchError>>>);

/// Per-call options for [`TieredCache::get`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Lifetime for a freshly fetched value; falls back to `default_ttl`.
    ///
    /// Ignored by a call that joins another caller's in-flight fetch: the
    /// entry is stored with the TTL of the call that started the fetch.
    pub ttl: Option<Duration>,
    /// Skip both cache tiers and go straight to the fetch.
    pub force_refresh: bool,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// Options that bypass both cache tiers.
    pub fn refresh() -> Self {
        Self::default().with_force_refresh(true)
    }
}

/// Builder for [`TieredCache`].
pub struct TieredCacheBuilder {
    config: CacheConfig,
    durable: Option<Arc<dyn DurableStore>>,
    clock: Arc<dyn Clock>,
}

impl TieredCacheBuilder {
    /// Attach a durable store as the L2 tier.
    pub fn durable_store<S: DurableStore + 'static>(mut self, store: Arc<S>) -> Self {
        self.durable = Some(store as Arc<dyn DurableStore>);
        self
    }

    /// Replace the system clock.
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Validate the configuration and build the cache.
    pub fn build(self) -> FolioResult<TieredCache> {
        self.config.validate()?;

        if self.config.enable_durable_tier && self.durable.is_none() {
            debug!(
                namespace = %self.config.namespace,
                "Durable tier enabled without a store; running memory-only"
            );
        }

        Ok(TieredCache {
            inner: Arc::new(Inner {
                remote_enabled: AtomicBool::new(self.config.enable_remote_fetch),
                config: self.config,
                memory: RwLock::new(HashMap::new()),
                durable: self.durable,
                tier_guard: Mutex::new(()),
                in_flight: StdMutex::new(HashMap::new()),
                flight_generation: AtomicU64::new(0),
                clock: self.clock,
                metrics: CacheMetrics::new(),
            }),
        })
    }
}

/// Read-through cache over a memory tier, an optional durable tier and a
/// caller-supplied fetch.
///
/// Cloning is cheap; clones share all state.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(LmdbStore::new("/var/lib/folio/cache", 64)?);
/// let cache = TieredCache::new(CacheConfig::from_env(), store)?;
///
/// let projects = cache
///     .get("projects", || async { api.list_projects().await }, GetOptions::new())
///     .await?;
///
/// match projects {
///     CacheOutcome::Hit(read) => render(read.value()),
///     CacheOutcome::StaleHit { read, reason } => render_with_banner(read.value(), &reason),
///     CacheOutcome::Miss | CacheOutcome::Failed(_) => render_empty(),
/// }
/// ```
#[derive(Clone)]
pub struct TieredCache {
    inner: Arc<Inner>,
}

struct Inner {
    config: CacheConfig,
    remote_enabled: AtomicBool,
    memory: RwLock<HashMap<String, CacheEntry<Value>>>,
    durable: Option<Arc<dyn DurableStore>>,
    /// Serializes every tier read-modify-write sequence.
    tier_guard: Mutex<()>,
    in_flight: StdMutex<HashMap<String, InFlightFetch>>,
    flight_generation: AtomicU64,
    clock: Arc<dyn Clock>,
    metrics: CacheMetrics,
}

impl TieredCache {
    /// Start building a cache with the system clock and no durable tier.
    pub fn builder(config: CacheConfig) -> TieredCacheBuilder {
        TieredCacheBuilder {
            config,
            durable: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a cache backed by `store` as its durable tier.
    pub fn new<S: DurableStore + 'static>(config: CacheConfig, store: Arc<S>) -> FolioResult<Self> {
        Self::builder(config).durable_store(store).build()
    }

    /// Create a cache with no durable tier.
    pub fn memory_only(config: CacheConfig) -> FolioResult<Self> {
        Self::builder(config).build()
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Get a value, falling back through the tiers.
    ///
    /// In order, stopping at the first success:
    ///
    /// 1. Unless `force_refresh`, a valid memory entry.
    /// 2. Unless `force_refresh`, a valid durable entry, promoted into memory.
    /// 3. If remote fetch is enabled, `fetch()`; the result populates both tiers.
    /// 4. A durable entry regardless of validity, as [`CacheOutcome::StaleHit`].
    ///
    /// At most one fetch runs per call. With `single_flight` enabled,
    /// concurrent misses on the same key share a single fetch, and the
    /// populated entry carries the starting call's TTL. A shared fetch keeps
    /// running if the call that started it is dropped.
    ///
    /// # Errors
    ///
    /// Only caller errors (an empty key) are returned as `Err`. Tier and fetch
    /// failures are reported through the outcome.
    pub async fn get<T, F, Fut, E>(
        &self,
        key: &str,
        fetch: F,
        options: GetOptions,
    ) -> FolioResult<CacheOutcome<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let key = self.namespaced(key)?;
        let inner = &self.inner;

        if !options.force_refresh {
            if let Some(read) = inner.memory_lookup::<T>(key.key()) {
                CacheMetrics::incr(&inner.metrics.memory_hits);
                debug!(key = %key.key(), "Cache hit (memory)");
                return Ok(CacheOutcome::Hit(read));
            }

            if let Some(read) = inner.promote_from_durable::<T>(&key).await {
                CacheMetrics::incr(&inner.metrics.durable_hits);
                debug!(key = %key.key(), "Cache hit (durable), promoted to memory");
                return Ok(CacheOutcome::Hit(read));
            }
        }

        let failure = if self.is_remote_fetch_enabled() {
            let ttl = options.ttl.unwrap_or(inner.config.default_ttl);
            match self.fetch_remote(&key, fetch, ttl).await {
                Ok(entry) => match serde_json::from_value::<T>(entry.value) {
                    Ok(value) => {
                        return Ok(CacheOutcome::Hit(CacheRead::new(
                            value,
                            entry.created_at,
                            Tier::Remote,
                        )));
                    }
                    Err(e) => FetchError::Serialization {
                        key: key.key().to_string(),
                        reason: e.to_string(),
                    },
                },
                Err(e) => e,
            }
        } else {
            FetchError::RemoteDisabled
        };

        if let Some(read) = inner.stale_from_durable::<T>(&key).await {
            CacheMetrics::incr(&inner.metrics.stale_fallbacks);
            warn!(
                key = %key.key(),
                reason = %failure,
                "Serving stale durable entry"
            );
            return Ok(CacheOutcome::StaleHit {
                read,
                reason: failure,
            });
        }

        CacheMetrics::incr(&inner.metrics.misses);
        if failure.is_remote_disabled() {
            debug!(key = %key.key(), "Cache miss with remote fetch disabled");
            Ok(CacheOutcome::Miss)
        } else {
            debug!(key = %key.key(), reason = %failure, "Cache miss, no fallback available");
            Ok(CacheOutcome::Failed(failure))
        }
    }

    /// Like [`get`](Self::get), but collapses every empty outcome (and an
    /// invalid key) to `T::default()`.
    pub async fn get_or_default<T, F, Fut, E>(&self, key: &str, fetch: F, options: GetOptions) -> T
    where
        T: Serialize + DeserializeOwned + Default + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        match self.get(key, fetch, options).await {
            Ok(outcome) => outcome.into_value_or_default(),
            Err(e) => {
                warn!(key = %key, error = %e, "Rejected cache read");
                T::default()
            }
        }
    }

    /// Create or replace an entry in memory and, if enabled, the durable tier.
    ///
    /// Durable-tier write failures are logged and ignored.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        origin: Option<Origin>,
    ) -> FolioResult<()> {
        let key = self.namespaced(key)?;
        let value = serde_json::to_value(value).map_err(|e| ValidationError::InvalidValue {
            field: "value".to_string(),
            reason: e.to_string(),
        })?;

        let entry = CacheEntry::new(
            value,
            self.inner.clock.now(),
            ttl.unwrap_or(self.inner.config.default_ttl),
            origin.unwrap_or(Origin::Remote),
        );

        let _guard = self.inner.tier_guard.lock().await;
        self.inner.store_entry(&key, entry).await;
        Ok(())
    }

    /// Remove a key from both tiers.
    ///
    /// Returns true if anything was removed.
    pub async fn invalidate(&self, key: &str) -> FolioResult<bool> {
        let key = self.namespaced(key)?;
        let _guard = self.inner.tier_guard.lock().await;

        let from_memory = self.inner.memory_write().remove(key.key()).is_some();
        let from_durable = match self.inner.durable() {
            Some(store) => self.inner.delete_durable(store, &key).await,
            None => false,
        };

        debug!(key = %key.key(), from_memory, from_durable, "Invalidated cache entry");
        Ok(from_memory || from_durable)
    }

    /// Remove every invalid memory entry and its durable record.
    ///
    /// Returns the number of memory entries removed. Idempotent.
    pub async fn clear_expired(&self) -> usize {
        let inner = &self.inner;
        let _guard = inner.tier_guard.lock().await;
        let now = inner.clock.now();
        let max_age = inner.config.max_age;

        let expired: Vec<String> = {
            let mut memory = inner.memory_write();
            let keys: Vec<String> = memory
                .iter()
                .filter(|(_, entry)| !entry.is_valid(now, max_age))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                memory.remove(key);
            }
            keys
        };

        if let Some(store) = inner.durable() {
            for key in &expired {
                if let Ok(key) = NamespacedKey::new(&inner.config.namespace, key) {
                    inner.delete_durable(store, &key).await;
                }
            }
        }

        if !expired.is_empty() {
            info!(removed = expired.len(), "Swept expired cache entries");
        }
        expired.len()
    }

    /// Empty the memory tier and delete this cache's durable records.
    ///
    /// Durable records outside the cache namespace are untouched.
    pub async fn clear(&self) {
        let inner = &self.inner;
        let _guard = inner.tier_guard.lock().await;

        let cleared = {
            let mut memory = inner.memory_write();
            let count = memory.len();
            memory.clear();
            count
        };

        let mut deleted = 0usize;
        if let Some(store) = inner.durable() {
            let prefix = NamespacedKey::namespace_prefix(&inner.config.namespace);
            match store.keys_with_prefix(&prefix).await {
                Ok(keys) => {
                    for key in keys {
                        match store.delete(&key).await {
                            Ok(true) => deleted += 1,
                            Ok(false) => {}
                            Err(e) => warn!(key = %key, error = %e, "Durable delete failed"),
                        }
                    }
                }
                Err(e) => warn!(prefix = %prefix, error = %e, "Durable key scan failed"),
            }
        }

        info!(memory = cleared, durable = deleted, "Cleared cache");
    }

    /// Statistics computed against the current time.
    pub fn stats(&self) -> CacheStats {
        let inner = &self.inner;
        let now = inner.clock.now();
        let mut stats = CacheStats::default();

        {
            let memory = inner.memory_read();
            stats.total_entries = memory.len();
            for entry in memory.values() {
                if entry.is_valid(now, inner.config.max_age) {
                    stats.valid_entries += 1;
                } else {
                    stats.expired_entries += 1;
                }
                stats.by_origin.record(entry.origin);
            }
        }

        stats.metrics = inner.metrics.snapshot();
        stats
    }

    /// Allow subsequent reads to call their fetch.
    pub fn enable_remote_fetch(&self) {
        self.inner.remote_enabled.store(true, Ordering::SeqCst);
        info!("Remote fetch enabled");
    }

    /// Serve subsequent reads from the cache tiers only.
    pub fn disable_remote_fetch(&self) {
        self.inner.remote_enabled.store(false, Ordering::SeqCst);
        info!("Remote fetch disabled");
    }

    pub fn is_remote_fetch_enabled(&self) -> bool {
        self.inner.remote_enabled.load(Ordering::SeqCst)
    }

    fn namespaced(&self, key: &str) -> FolioResult<NamespacedKey> {
        NamespacedKey::new(&self.inner.config.namespace, key)
    }

    /// Run the fetch, joining an in-flight one for the same key if enabled.
    ///
    /// A shared fetch runs as its own task and clears its slot when done, so
    /// it completes (bounded by `fetch_timeout`) even if every caller waiting
    /// on it is dropped.
    async fn fetch_remote<T, F, Fut, E>(
        &self,
        key: &NamespacedKey,
        fetch: F,
        ttl: Duration,
    ) -> Result<CacheEntry<Value>, FetchError>
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        if !self.inner.config.single_flight {
            return self.inner.fetch_and_populate(key.clone(), fetch, ttl).await;
        }

        let ((generation, flight), joined) = {
            let mut in_flight = self.inner.in_flight_lock();
            match in_flight.get(key.key()) {
                Some(existing) => (existing.clone(), true),
                None => {
                    let generation = self.inner.flight_generation.fetch_add(1, Ordering::Relaxed);
                    let started = (generation, self.start_flight(key, generation, fetch, ttl));
                    in_flight.insert(key.key().to_string(), started.clone());
                    (started, false)
                }
            }
        };

        if joined {
            CacheMetrics::incr(&self.inner.metrics.coalesced);
            debug!(key = %key.key(), "Joined in-flight fetch");
        }

        let result = flight.await;
        // Covers a flight task that panicked before clearing its slot.
        self.inner.finish_flight(key.key(), generation);
        result
    }

    fn start_flight<T, F, Fut, E>(
        &self,
        key: &NamespacedKey,
        generation: u64,
        fetch: F,
        ttl: Duration,
    ) -> Shared<BoxFuture<'static, Result<CacheEntry<Value>, FetchError>>>
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let owned_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = inner.fetch_and_populate(owned_key.clone(), fetch, ttl).await;
            inner.finish_flight(owned_key.key(), generation);
            result
        });

        let flight_key = key.key().to_string();
        async move {
            handle.await.unwrap_or_else(|e| {
                Err(FetchError::Failed {
                    key: flight_key,
                    reason: format!("fetch task aborted: {e}"),
                })
            })
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    fn memory_read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry<Value>>> {
        self.memory.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn memory_write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry<Value>>> {
        self.memory.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight_lock(&self) -> MutexGuard<'_, HashMap<String, InFlightFetch>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the in-flight slot for `key` if it still belongs to `generation`.
    fn finish_flight(&self, key: &str, generation: u64) {
        let mut in_flight = self.in_flight_lock();
        if in_flight
            .get(key)
            .is_some_and(|(current, _)| *current == generation)
        {
            in_flight.remove(key);
        }
    }

    /// The durable store, when one is attached and the tier is enabled.
    fn durable(&self) -> Option<&Arc<dyn DurableStore>> {
        if self.config.enable_durable_tier {
            self.durable.as_ref()
        } else {
            None
        }
    }

    fn memory_lookup<T: DeserializeOwned>(&self, key: &str) -> Option<CacheRead<T>> {
        let now = self.clock.now();
        let (value, cached_at) = {
            let memory = self.memory_read();
            let entry = memory.get(key)?;
            if !entry.is_valid(now, self.config.max_age) {
                return None;
            }
            (entry.value.clone(), entry.created_at)
        };

        let value = decode_value::<T>(key, value)?;
        Some(CacheRead::new(value, cached_at, Tier::Memory))
    }

    /// Serve a valid durable entry and copy it into memory.
    async fn promote_from_durable<T: DeserializeOwned>(
        &self,
        key: &NamespacedKey,
    ) -> Option<CacheRead<T>> {
        let store = self.durable()?;
        let _guard = self.tier_guard.lock().await;

        let entry = self.read_durable(store, key).await?;
        if !entry.is_valid(self.clock.now(), self.config.max_age) {
            debug!(key = %key.key(), "Durable entry expired");
            return None;
        }

        let value = decode_value::<T>(key.key(), entry.value.clone())?;
        let cached_at = entry.created_at;
        self.memory_write()
            .insert(key.key().to_string(), entry.with_origin(Origin::Durable));

        Some(CacheRead::new(value, cached_at, Tier::Durable))
    }

    /// Serve a durable entry regardless of validity. Nothing is rewritten.
    async fn stale_from_durable<T: DeserializeOwned>(
        &self,
        key: &NamespacedKey,
    ) -> Option<CacheRead<T>> {
        let store = self.durable()?;
        let entry = self.read_durable(store, key).await?;
        let value = decode_value::<T>(key.key(), entry.value)?;
        Some(CacheRead::new(value, entry.created_at, Tier::Durable))
    }

    async fn fetch_and_populate<T, F, Fut, E>(
        &self,
        key: NamespacedKey,
        fetch: F,
        ttl: Duration,
    ) -> Result<CacheEntry<Value>, FetchError>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        CacheMetrics::incr(&self.metrics.remote_fetches);
        debug!(key = %key.key(), "Fetching from remote");

        let timeout = self.config.fetch_timeout;
        let fetched = match tokio::time::timeout(timeout, fetch()).await {
            Ok(Ok(value)) => serde_json::to_value(&value).map_err(|e| FetchError::Serialization {
                key: key.key().to_string(),
                reason: e.to_string(),
            }),
            Ok(Err(e)) => Err(FetchError::Failed {
                key: key.key().to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(FetchError::TimedOut {
                key: key.key().to_string(),
                after: timeout,
            }),
        };

        let value = match fetched {
            Ok(value) => value,
            Err(e) => {
                CacheMetrics::incr(&self.metrics.fetch_failures);
                warn!(key = %key.key(), error = %e, "Remote fetch failed");
                return Err(e);
            }
        };

        let entry = CacheEntry::new(value, self.clock.now(), ttl, Origin::Remote);
        let _guard = self.tier_guard.lock().await;
        self.store_entry(&key, entry.clone()).await;
        Ok(entry)
    }

    /// Write an entry to memory and, if enabled, the durable tier.
    ///
    /// Callers hold `tier_guard`.
    async fn store_entry(&self, key: &NamespacedKey, entry: CacheEntry<Value>) {
        if let Some(store) = self.durable() {
            let encoded = key.encode();
            match record::encode(&encoded, &entry) {
                Ok(bytes) => {
                    if let Err(e) = store.write(&encoded, &bytes).await {
                        warn!(key = %encoded, error = %e, "Durable write failed");
                    }
                }
                Err(e) => warn!(key = %encoded, error = %e, "Durable record encoding failed"),
            }
        }

        self.memory_write().insert(key.key().to_string(), entry);
    }

    /// Read and decode a durable record; any failure is a miss.
    async fn read_durable(
        &self,
        store: &Arc<dyn DurableStore>,
        key: &NamespacedKey,
    ) -> Option<CacheEntry<Value>> {
        let encoded = key.encode();
        let bytes = match store.read(&encoded).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %encoded, error = %e, "Durable read failed");
                return None;
            }
        };

        match record::decode(&encoded, &bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key = %encoded, error = %e, "Discarding unreadable durable record");
                None
            }
        }
    }

    async fn delete_durable(&self, store: &Arc<dyn DurableStore>, key: &NamespacedKey) -> bool {
        let encoded = key.encode();
        match store.delete(&encoded).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(key = %encoded, error = %e, "Durable delete failed");
                false
            }
        }
    }
}

fn decode_value<T: DeserializeOwned>(key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, error = %e, "Cached value does not match requested type");
            None
        }
    }
}
