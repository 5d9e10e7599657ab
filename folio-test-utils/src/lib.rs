//! Folio Test Utilities
//!
//! Shared test infrastructure for the folio workspace:
//! - Instrumented and failure-injecting durable stores
//! - Fetch closures with call counting
//! - Proptest generators for keys, TTLs and configs
//! - Fixtures and assertions for cache outcomes

pub use folio_core::{
    CacheConfig, Clock, FetchError, FolioError, FolioResult, ManualClock, StoreError, Timestamp,
};
pub use folio_storage::cache::{
    CacheEntry, CacheOutcome, CacheRead, DurableStore, GetOptions, LmdbStore, MemoryStore, Origin,
    Tier, TieredCache,
};

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-writer tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to debug output for the folio crates.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("folio_storage=debug,folio_core=debug,warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// INSTRUMENTED STORES
// ============================================================================

/// Counts calls to a wrapped durable store.
#[derive(Debug, Default)]
pub struct CountingStore<S> {
    inner: S,
    reads: AtomicUsize,
    writes: AtomicUsize,
    deletes: AtomicUsize,
    scans: AtomicUsize,
}

impl<S: DurableStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            scans: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: DurableStore> DurableStore for CountingStore<S> {
    async fn read(&self, key: &str) -> FolioResult<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> FolioResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(key, bytes).await
    }

    async fn delete(&self, key: &str) -> FolioResult<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> FolioResult<Vec<String>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.inner.keys_with_prefix(prefix).await
    }
}

/// A memory store whose reads and writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FailingStore {
    /// A store that works until told otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store where every operation fails.
    pub fn broken() -> Self {
        let store = Self::default();
        store.set_fail_reads(true);
        store.set_fail_writes(true);
        store
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Writes and deletes.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn backend_error(op: &str) -> FolioError {
        FolioError::Storage(StoreError::Backend {
            reason: format!("injected {op} failure"),
        })
    }
}

#[async_trait]
impl DurableStore for FailingStore {
    async fn read(&self, key: &str) -> FolioResult<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::backend_error("read"));
        }
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> FolioResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::backend_error("write"));
        }
        self.inner.write(key, bytes).await
    }

    async fn delete(&self, key: &str) -> FolioResult<bool> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::backend_error("delete"));
        }
        self.inner.delete(key).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> FolioResult<Vec<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::backend_error("scan"));
        }
        self.inner.keys_with_prefix(prefix).await
    }
}

// ============================================================================
// FETCH HELPERS
// ============================================================================

/// Boxed fetch future used by [`FetchCounter`].
pub type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

/// Builds fetch closures that count how many times they were invoked.
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct FetchCounter {
    calls: Arc<AtomicUsize>,
}

impl FetchCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fetches started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A fetch that succeeds with `value`.
    pub fn ok<T: Send + 'static>(
        &self,
        value: T,
    ) -> impl FnOnce() -> FetchFuture<T> + Send + 'static {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok::<T, String>(value) }) as FetchFuture<T>
        }
    }

    /// A fetch that fails with `reason`.
    pub fn fail<T: Send + 'static>(
        &self,
        reason: &str,
    ) -> impl FnOnce() -> FetchFuture<T> + Send + 'static {
        let calls = Arc::clone(&self.calls);
        let reason = reason.to_string();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Err::<T, String>(reason) }) as FetchFuture<T>
        }
    }

    /// A fetch that never completes.
    pub fn hang<T: Send + 'static>(&self) -> impl FnOnce() -> FetchFuture<T> + Send + 'static {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(std::future::pending()) as FetchFuture<T>
        }
    }

    /// A fetch that succeeds with `value` after `delay`.
    pub fn delayed<T: Send + 'static>(
        &self,
        value: T,
        delay: Duration,
    ) -> impl FnOnce() -> FetchFuture<T> + Send + 'static {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok::<T, String>(value)
            }) as FetchFuture<T>
        }
    }

    /// A fetch that succeeds with `value` once `release` fires.
    pub fn gated<T: Send + 'static>(
        &self,
        value: T,
        release: oneshot::Receiver<()>,
    ) -> impl FnOnce() -> FetchFuture<T> + Send + 'static {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                release
                    .await
                    .map_err(|_| "gate dropped before release".to_string())?;
                Ok::<T, String>(value)
            }) as FetchFuture<T>
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache inputs.

    use super::*;
    use proptest::prelude::*;

    /// Non-empty caller key, including separators and path-like characters.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-z0-9_/:.-]{1,32}"
    }

    /// Namespace that passes config validation.
    pub fn arb_namespace() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}"
    }

    /// TTL between one second and two days.
    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        (1u64..172_800).prop_map(Duration::from_secs)
    }

    /// A small JSON document shaped like typical cached API payloads.
    pub fn arb_payload() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            "[ -~]{0,24}".prop_map(serde_json::Value::from),
        ];
        leaf.prop_recursive(3, 24, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(serde_json::Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                    .prop_map(|map| serde_json::Value::Object(map.into_iter().collect())),
            ]
        })
    }

    /// A configuration that passes validation.
    pub fn arb_valid_config() -> impl Strategy<Value = CacheConfig> {
        (
            arb_namespace(),
            arb_ttl(),
            arb_ttl(),
            any::<bool>(),
            any::<bool>(),
            1u64..3600,
            1u64..120,
            any::<bool>(),
        )
            .prop_map(
                |(namespace, ttl, max_age, durable, remote, sweep, timeout, single_flight)| {
                    CacheConfig::default()
                        .with_namespace(namespace)
                        .with_default_ttl(ttl)
                        .with_max_age(max_age)
                        .with_durable_tier(durable)
                        .with_remote_fetch(remote)
                        .with_sweep_interval(Duration::from_secs(sweep))
                        .with_fetch_timeout(Duration::from_secs(timeout))
                        .with_single_flight(single_flight)
                },
            )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made caches for integration tests.

    use super::*;

    /// Cache over a shared [`MemoryStore`] with a manual clock.
    pub fn memory_cache(config: CacheConfig) -> (TieredCache, Arc<MemoryStore>, ManualClock) {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::starting_now();
        let cache = TieredCache::builder(config)
            .durable_store(Arc::clone(&store))
            .clock(clock.clone())
            .build()
            .expect("fixture config should be valid");
        (cache, store, clock)
    }

    /// Cache over an arbitrary store with a manual clock.
    pub fn cache_over<S: DurableStore + 'static>(
        config: CacheConfig,
        store: Arc<S>,
        clock: &ManualClock,
    ) -> TieredCache {
        TieredCache::builder(config)
            .durable_store(store)
            .clock(clock.clone())
            .build()
            .expect("fixture config should be valid")
    }

    /// Config with short intervals suited to tests that run the sweeper.
    pub fn fast_config() -> CacheConfig {
        CacheConfig::default()
            .with_sweep_interval(Duration::from_millis(20))
            .with_fetch_timeout(Duration::from_millis(200))
    }

    /// Sample payload shaped like a project listing.
    pub fn projects() -> Vec<String> {
        vec![
            "folio".to_string(),
            "lmdb-tools".to_string(),
            "dotfiles".to_string(),
        ]
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for cache outcomes.

    use super::*;

    /// Assert a fresh hit served from `tier`.
    pub fn assert_hit_from<T: std::fmt::Debug>(outcome: &CacheOutcome<T>, tier: Tier) {
        assert!(outcome.is_hit(), "Expected hit, got: {:?}", outcome);
        assert_eq!(outcome.tier(), Some(tier), "Wrong tier for: {:?}", outcome);
    }

    /// Assert a stale durable value served in place of a failed fetch.
    pub fn assert_stale<T: std::fmt::Debug>(outcome: &CacheOutcome<T>) {
        assert!(outcome.is_stale(), "Expected stale hit, got: {:?}", outcome);
        assert_eq!(outcome.tier(), Some(Tier::Durable));
    }

    /// Assert the fetch failed with nothing to fall back on.
    pub fn assert_failed<T: std::fmt::Debug>(outcome: &CacheOutcome<T>) {
        assert!(
            matches!(outcome, CacheOutcome::Failed(_)),
            "Expected failed outcome, got: {:?}",
            outcome
        );
    }

    pub fn assert_validation_error<T: std::fmt::Debug>(result: &FolioResult<T>) {
        assert!(
            matches!(result, Err(FolioError::Validation(_))),
            "Expected validation error, got: {:?}",
            result
        );
    }
}
