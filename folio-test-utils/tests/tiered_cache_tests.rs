//! End-to-end behavior of the tiered cache over instrumented stores.

use std::sync::Arc;
use std::time::Duration;

use folio_test_utils::assertions::*;
use folio_test_utils::fixtures::*;
use folio_test_utils::*;
use tokio::sync::oneshot;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn ttl_expiry_triggers_refetch() {
    init_test_tracing();
    let (cache, _store, clock) = memory_cache(CacheConfig::default().with_max_age(24 * HOUR));
    let fetches = FetchCounter::new();
    let options = GetOptions::new().with_ttl(10 * MINUTE);

    let first = cache.get("skills", fetches.ok(projects()), options).await.unwrap();
    assert_hit_from(&first, Tier::Remote);

    clock.advance(10 * MINUTE - Duration::from_millis(1));
    let cached = cache.get("skills", fetches.ok(projects()), options).await.unwrap();
    assert_hit_from(&cached, Tier::Memory);
    assert_eq!(fetches.calls(), 1);

    clock.advance(Duration::from_millis(1));
    let refetched = cache.get("skills", fetches.ok(projects()), options).await.unwrap();
    assert_hit_from(&refetched, Tier::Remote);
    assert_eq!(fetches.calls(), 2);
}

#[tokio::test]
async fn max_age_ceiling_overrides_long_ttl() {
    let (cache, _store, clock) = memory_cache(CacheConfig::default().with_max_age(24 * HOUR));
    let fetches = FetchCounter::new();
    let options = GetOptions::new().with_ttl(48 * HOUR);

    cache.get("about", fetches.ok("bio".to_string()), options).await.unwrap();
    clock.advance(23 * HOUR);
    cache.get("about", fetches.ok("bio".to_string()), options).await.unwrap();
    assert_eq!(fetches.calls(), 1);

    clock.advance(2 * HOUR);
    let stats = cache.stats();
    assert_eq!(stats.expired_entries, 1);

    cache.get("about", fetches.ok("bio".to_string()), options).await.unwrap();
    assert_eq!(fetches.calls(), 2);
}

#[tokio::test]
async fn stale_durable_value_served_when_fetch_fails() {
    let (cache, store, clock) = memory_cache(CacheConfig::default());
    cache.set("projects", &projects(), Some(MINUTE), None).await.unwrap();

    // A fresh process sees only the durable tier.
    let restarted = cache_over(CacheConfig::default(), store, &clock);
    clock.advance(3 * HOUR);

    let fetches = FetchCounter::new();
    let outcome = restarted
        .get("projects", fetches.fail::<Vec<String>>("HTTP 502"), GetOptions::new())
        .await
        .unwrap();

    assert_stale(&outcome);
    assert_eq!(fetches.calls(), 1);
    assert!(matches!(
        outcome.failure(),
        Some(FetchError::Failed { reason, .. }) if reason == "HTTP 502"
    ));
    assert_eq!(outcome.into_value(), Some(projects()));
}

#[tokio::test]
async fn force_refresh_always_fetches() {
    let (cache, _store, _clock) = memory_cache(CacheConfig::default());
    let fetches = FetchCounter::new();

    cache.get("blog", fetches.ok(1u32), GetOptions::new()).await.unwrap();
    for expected in 2..=4 {
        let outcome = cache
            .get("blog", fetches.ok(expected as u32), GetOptions::refresh())
            .await
            .unwrap();
        assert_hit_from(&outcome, Tier::Remote);
        assert_eq!(fetches.calls(), expected);
    }

    let latest = cache.get("blog", fetches.ok(0u32), GetOptions::new()).await.unwrap();
    assert_eq!(latest.into_value(), Some(4));
}

#[tokio::test]
async fn durable_hit_is_promoted_and_not_reread() {
    let clock = ManualClock::starting_now();
    let backing = MemoryStore::new();
    let seeding = cache_over(CacheConfig::default(), Arc::new(backing.clone()), &clock);
    seeding.set("projects", &projects(), Some(HOUR), None).await.unwrap();

    let counting = Arc::new(CountingStore::new(backing));
    let cache = cache_over(CacheConfig::default(), Arc::clone(&counting), &clock);
    let fetches = FetchCounter::new();

    let first = cache
        .get("projects", fetches.ok(Vec::<String>::new()), GetOptions::new())
        .await
        .unwrap();
    assert_hit_from(&first, Tier::Durable);
    let reads_after_promotion = counting.reads();
    assert_eq!(reads_after_promotion, 1);

    let second = cache
        .get("projects", fetches.ok(Vec::<String>::new()), GetOptions::new())
        .await
        .unwrap();
    assert_hit_from(&second, Tier::Memory);
    assert_eq!(counting.reads(), reads_after_promotion);
    assert_eq!(fetches.calls(), 0);
    assert_eq!(second.into_value(), Some(projects()));
}

#[tokio::test]
async fn clear_leaves_foreign_durable_keys() {
    let (cache, store, clock) = memory_cache(CacheConfig::default());
    let neighbour = cache_over(
        CacheConfig::default().with_namespace("drafts"),
        Arc::clone(&store),
        &clock,
    );

    cache.set("a", &1, None, None).await.unwrap();
    cache.set("b", &2, None, None).await.unwrap();
    neighbour.set("a", &3, None, None).await.unwrap();
    store.write("theme", b"dark").await.unwrap();

    cache.clear().await;

    assert_eq!(cache.stats().total_entries, 0);
    assert!(store.keys_with_prefix("folio_cache:").await.unwrap().is_empty());
    assert!(store.contains("theme"));
    assert!(store.contains("drafts:a"));

    let survivor = neighbour
        .get("a", FetchCounter::new().fail::<i32>("offline"), GetOptions::new())
        .await
        .unwrap();
    assert_eq!(survivor.into_value(), Some(3));
}

#[tokio::test]
async fn total_failure_returns_default_without_error() {
    let (cache, store, _clock) = memory_cache(CacheConfig::default().with_durable_tier(false));
    let fetches = FetchCounter::new();

    let outcome = cache
        .get("projects", fetches.fail::<Vec<String>>("DNS failure"), GetOptions::new())
        .await
        .unwrap();
    assert_failed(&outcome);
    assert!(outcome.into_value_or_default().is_empty());

    let value: Vec<String> = cache
        .get_or_default("projects", fetches.fail("DNS failure"), GetOptions::new())
        .await;
    assert!(value.is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn clear_expired_twice_matches_once() {
    let (cache, store, clock) = memory_cache(CacheConfig::default());
    cache.set("short", &1, Some(MINUTE), None).await.unwrap();
    cache.set("medium", &2, Some(10 * MINUTE), None).await.unwrap();
    cache.set("long", &3, Some(HOUR), None).await.unwrap();
    clock.advance(15 * MINUTE);

    assert_eq!(cache.clear_expired().await, 2);
    let once = (cache.stats(), store.keys_with_prefix("").await.unwrap());

    assert_eq!(cache.clear_expired().await, 0);
    let twice = (cache.stats(), store.keys_with_prefix("").await.unwrap());

    assert_eq!(once, twice);
    assert_eq!(twice.1, vec!["folio_cache:long".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_one_fetch() {
    let (cache, _store, _clock) = memory_cache(CacheConfig::default());
    let fetches = FetchCounter::new();
    let (release, gate) = oneshot::channel();

    let leader = {
        let cache = cache.clone();
        let fetch = fetches.gated(projects(), gate);
        tokio::spawn(async move { cache.get("projects", fetch, GetOptions::new()).await })
    };
    while fetches.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let followers: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let fetch = fetches.ok(Vec::<String>::new());
            tokio::spawn(async move { cache.get("projects", fetch, GetOptions::new()).await })
        })
        .collect();
    while cache.stats().metrics.coalesced < 8 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    release.send(()).unwrap();

    assert_eq!(leader.await.unwrap().unwrap().into_value(), Some(projects()));
    for follower in followers {
        let outcome = follower.await.unwrap().unwrap();
        assert_hit_from(&outcome, Tier::Remote);
        assert_eq!(outcome.into_value(), Some(projects()));
    }
    assert_eq!(fetches.calls(), 1);
}

#[tokio::test]
async fn without_single_flight_each_miss_fetches() {
    let (cache, _store, _clock) = memory_cache(CacheConfig::default().with_single_flight(false));
    let fetches = FetchCounter::new();

    let a = cache.get("k", fetches.delayed(1u8, Duration::from_millis(20)), GetOptions::new());
    let b = cache.get("k", fetches.delayed(2u8, Duration::from_millis(20)), GetOptions::new());
    let (a, b) = tokio::join!(a, b);

    assert!(a.unwrap().is_hit());
    assert!(b.unwrap().is_hit());
    assert_eq!(fetches.calls(), 2);
}

#[tokio::test]
async fn hanging_fetch_times_out_to_stale_value() {
    let config = CacheConfig::default().with_fetch_timeout(Duration::from_millis(30));
    let (cache, _store, clock) = memory_cache(config);
    cache.set("feed", &"cached".to_string(), Some(MINUTE), None).await.unwrap();
    clock.advance(HOUR);

    let outcome = cache
        .get("feed", FetchCounter::new().hang::<String>(), GetOptions::new())
        .await
        .unwrap();

    assert_stale(&outcome);
    assert!(matches!(outcome.failure(), Some(FetchError::TimedOut { .. })));
    assert_eq!(outcome.value().map(String::as_str), Some("cached"));
}

#[tokio::test]
async fn remote_toggle_affects_later_reads_only() {
    let (cache, _store, _clock) = memory_cache(CacheConfig::default().with_remote_fetch(false));
    let fetches = FetchCounter::new();

    let miss = cache.get("k", fetches.ok(1u8), GetOptions::new()).await.unwrap();
    assert_eq!(miss, CacheOutcome::Miss);
    assert_eq!(fetches.calls(), 0);

    cache.enable_remote_fetch();
    cache.get("k", fetches.ok(1u8), GetOptions::new()).await.unwrap();
    cache.disable_remote_fetch();

    let cached = cache.get("k", fetches.ok(9u8), GetOptions::new()).await.unwrap();
    assert_hit_from(&cached, Tier::Memory);
    assert_eq!(cached.into_value(), Some(1));
    assert_eq!(fetches.calls(), 1);
}

#[tokio::test]
async fn durable_failures_degrade_to_memory_only() {
    let clock = ManualClock::starting_now();
    let store = Arc::new(FailingStore::broken());
    let cache = cache_over(CacheConfig::default(), Arc::clone(&store), &clock);
    let fetches = FetchCounter::new();

    cache.set("k", &5u32, None, None).await.unwrap();
    let outcome = cache.get("k", fetches.ok(6u32), GetOptions::new()).await.unwrap();
    assert_hit_from(&outcome, Tier::Memory);

    assert!(cache.invalidate("k").await.unwrap());
    let refetched = cache.get("k", fetches.ok(6u32), GetOptions::new()).await.unwrap();
    assert_hit_from(&refetched, Tier::Remote);

    cache.clear().await;
    assert_eq!(cache.stats().total_entries, 0);
}

#[tokio::test]
async fn corrupt_durable_record_is_a_miss() {
    let (cache, store, _clock) = memory_cache(CacheConfig::default());
    store.write("folio_cache:projects", b"\x00\x01garbage").await.unwrap();

    let outcome = cache
        .get("projects", FetchCounter::new().fail::<Vec<String>>("offline"), GetOptions::new())
        .await
        .unwrap();
    assert_failed(&outcome);
}

#[tokio::test]
async fn stats_track_origin_and_counters() {
    let (cache, store, clock) = memory_cache(CacheConfig::default());
    let fetches = FetchCounter::new();

    cache.get("remote", fetches.ok(1u8), GetOptions::new()).await.unwrap();
    cache.set("pinned", &2u8, Some(HOUR), Some(Origin::Fallback)).await.unwrap();

    let restarted = cache_over(CacheConfig::default(), Arc::clone(&store), &clock);
    restarted.get("remote", fetches.ok(0u8), GetOptions::new()).await.unwrap();
    restarted.get("remote", fetches.ok(0u8), GetOptions::new()).await.unwrap();

    let stats = restarted.stats();
    assert_eq!(stats.total_entries, 1);
    assert_eq!(stats.by_origin.durable, 1);
    assert_eq!(stats.metrics.durable_hits, 1);
    assert_eq!(stats.metrics.memory_hits, 1);
    assert_eq!(stats.metrics.remote_fetches, 0);
    assert!((stats.hit_rate() - 1.0).abs() < f64::EPSILON);

    let original = cache.stats();
    assert_eq!(original.by_origin.remote, 1);
    assert_eq!(original.by_origin.fallback, 1);
}

#[tokio::test]
async fn empty_key_is_rejected_everywhere() {
    let (cache, _store, _clock) = memory_cache(CacheConfig::default());

    assert_validation_error(&cache.get("", FetchCounter::new().ok(1u8), GetOptions::new()).await);
    assert_validation_error(&cache.set("", &1u8, None, None).await);
    assert_validation_error(&cache.invalidate("").await);
}

#[tokio::test]
async fn caller_giving_up_does_not_block_next_read() {
    let config = CacheConfig::default().with_fetch_timeout(Duration::from_millis(50));
    let (cache, _store, _clock) = memory_cache(config);
    let abandoned = FetchCounter::new();

    let gave_up = tokio::time::timeout(
        Duration::from_millis(5),
        cache.get("projects", abandoned.hang::<u32>(), GetOptions::new()),
    )
    .await;
    assert!(gave_up.is_err());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let healthy = FetchCounter::new();
    let outcome = cache.get("projects", healthy.ok(7u32), GetOptions::new()).await.unwrap();

    assert_hit_from(&outcome, Tier::Remote);
    assert_eq!(outcome.into_value(), Some(7));
    assert_eq!(abandoned.calls(), 1);
    assert_eq!(healthy.calls(), 1);
    assert_eq!(cache.stats().metrics.coalesced, 0);
}

#[tokio::test]
async fn sweep_cannot_drop_entry_populated_by_pending_fetch() {
    let (cache, store, clock) = memory_cache(CacheConfig::default());
    cache.set("projects", &Vec::<String>::new(), Some(MINUTE), None).await.unwrap();
    clock.advance(2 * MINUTE);

    let fetches = FetchCounter::new();
    let (release, gate) = oneshot::channel();
    let reader = {
        let cache = cache.clone();
        let fetch = fetches.gated(projects(), gate);
        tokio::spawn(async move { cache.get("projects", fetch, GetOptions::new()).await })
    };
    while fetches.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(cache.clear_expired().await, 1);
    release.send(()).unwrap();
    let concurrent_sweep = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.clear_expired().await })
    };

    let fetched = reader.await.unwrap().unwrap();
    assert_hit_from(&fetched, Tier::Remote);
    assert_eq!(concurrent_sweep.await.unwrap(), 0);
    assert_eq!(cache.clear_expired().await, 0);

    let cached = cache
        .get("projects", fetches.fail::<Vec<String>>("offline"), GetOptions::new())
        .await
        .unwrap();
    assert_hit_from(&cached, Tier::Memory);
    assert_eq!(cached.into_value(), Some(projects()));
    assert!(store.contains("folio_cache:projects"));
    assert_eq!(fetches.calls(), 1);
}
