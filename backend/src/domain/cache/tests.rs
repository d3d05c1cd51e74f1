//! Behavioural tests for the three cache read policies.

use std::cell::Cell;
use std::convert::Infallible;
use std::future::{Ready, ready};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::future::join_all;
use rstest::{fixture, rstest};
use tokio::sync::oneshot;

use super::*;
use crate::test_support::{InMemoryStore, MutableClock, RecordingSleeper};

const TTLS: CacheTtl = CacheTtl {
    ttl: Duration::from_secs(1_800),
    null_ttl: Duration::from_secs(120),
};
const LOGICAL_TTL: Duration = Duration::from_secs(20);

struct Harness {
    store: Arc<InMemoryStore>,
    clock: Arc<MutableClock>,
    cache: CacheCoordinator,
}

fn harness_with(config: CachePolicyConfig, sleeper: Arc<dyn Sleeper>) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(MutableClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid time"),
    ));
    let cache = CacheCoordinator::with_runtime(
        store.clone(),
        clock.clone(),
        CacheRuntime {
            sleeper,
            jitter: Arc::new(NoTtlJitter),
        },
        config,
    );
    Harness {
        store,
        clock,
        cache,
    }
}

#[fixture]
fn harness() -> Harness {
    harness_with(
        CachePolicyConfig::default(),
        Arc::new(RecordingSleeper::default()),
    )
}

#[fixture]
fn key() -> CacheKey {
    CacheKey::for_entity("cache:shop:", 1).expect("valid key")
}

fn counted(
    calls: &Arc<AtomicUsize>,
    value: Option<&'static str>,
) -> impl FnOnce() -> Ready<Result<Option<String>, Infallible>> + Send + 'static {
    let calls = calls.clone();
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        ready(Ok(value.map(str::to_owned)))
    }
}

#[rstest]
#[tokio::test]
async fn misses_load_once_then_hit(harness: Harness, key: CacheKey) {
    let calls = Arc::new(AtomicUsize::new(0));

    let first: Option<String> = harness
        .cache
        .get_or_load(&key, TTLS, counted(&calls, Some("noodle bar")))
        .await
        .expect("loaded");
    let second: Option<String> = harness
        .cache
        .get_or_load(&key, TTLS, counted(&calls, Some("other")))
        .await
        .expect("cached");

    assert_eq!(first.as_deref(), Some("noodle bar"));
    assert_eq!(second.as_deref(), Some("noodle bar"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.store.written_ttl(key.as_str()), Some(TTLS.ttl));
}

#[rstest]
#[tokio::test]
async fn unknown_ids_are_cached_as_the_empty_sentinel(harness: Harness, key: CacheKey) {
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let value: Option<String> = harness
            .cache
            .get_or_load(&key, TTLS, counted(&calls, None))
            .await
            .expect("read");
        assert_eq!(value, None);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1, "sentinel stops repeat lookups");
    assert_eq!(harness.store.peek(key.as_str()).as_deref(), Some(EMPTY_SENTINEL));
    assert_eq!(harness.store.written_ttl(key.as_str()), Some(TTLS.null_ttl));
}

#[rstest]
#[tokio::test]
async fn loader_failures_are_not_cached(harness: Harness, key: CacheKey) {
    let err = harness
        .cache
        .get_or_load::<String, _, _, _>(&key, TTLS, || ready(Err("database down")))
        .await
        .expect_err("loader failed");

    assert!(matches!(err, CacheError::Loader { ref message, .. } if message == "database down"));
    assert_eq!(harness.store.peek(key.as_str()), None);
}

#[rstest]
#[tokio::test]
async fn corrupt_records_are_reported(harness: Harness, key: CacheKey) {
    harness.store.put(key.as_str(), "{not json");
    let calls = Arc::new(AtomicUsize::new(0));

    let err = harness
        .cache
        .get_or_load(&key, TTLS, counted(&calls, Some("x")))
        .await
        .expect_err("corrupt");

    assert!(matches!(err, CacheError::Corrupt { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test]
async fn concurrent_misses_under_the_mutex_policy_load_once(key: CacheKey) {
    let config = CachePolicyConfig {
        mutex_retry: RetryPolicy::new(200, Duration::from_millis(5)),
        ..CachePolicyConfig::default()
    };
    let harness = harness_with(config, Arc::new(TokioSleeper));
    let calls = Arc::new(AtomicUsize::new(0));

    let reads = (0..20).map(|_| {
        let cache = harness.cache.clone();
        let key = key.clone();
        let calls = calls.clone();
        tokio::spawn(async move {
            cache
                .get_with_lock(&key, TTLS, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok::<_, Infallible>(Some("hot shop".to_owned()))
                })
                .await
        })
    });

    for joined in join_all(reads).await {
        let value = joined.expect("task ran").expect("read");
        assert_eq!(value.as_deref(), Some("hot shop"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.store.peek("lock:rebuild:cache:shop:1"), None);
}

#[rstest]
#[tokio::test]
async fn mutex_policy_times_out_after_bounded_retries(key: CacheKey) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let harness = harness_with(CachePolicyConfig::default(), sleeper.clone());
    harness.store.put("lock:rebuild:cache:shop:1", "someone-else");
    let calls = Arc::new(AtomicUsize::new(0));

    let err = harness
        .cache
        .get_with_lock(&key, TTLS, counted(&calls, Some("x")))
        .await
        .expect_err("lock held throughout");

    assert_eq!(
        err,
        CacheError::LockTimeout {
            key: key.to_string(),
            attempts: 20
        }
    );
    assert_eq!(sleeper.calls(), vec![Duration::from_millis(50); 19]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test]
async fn mutex_policy_releases_the_lock_when_loading_fails(harness: Harness, key: CacheKey) {
    let err = harness
        .cache
        .get_with_lock::<String, _, _, _>(&key, TTLS, || ready(Err("timeout")))
        .await
        .expect_err("loader failed");

    assert!(matches!(err, CacheError::Loader { .. }));
    assert_eq!(harness.store.peek("lock:rebuild:cache:shop:1"), None);
}

#[rstest]
#[tokio::test]
async fn logical_expiry_treats_absent_keys_as_misses(harness: Harness, key: CacheKey) {
    let calls = Arc::new(AtomicUsize::new(0));

    let value: Option<String> = harness
        .cache
        .get_with_logical_expiry(&key, LOGICAL_TTL, counted(&calls, Some("x")))
        .await
        .expect("read");

    assert_eq!(value, None);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no rebuild for absent keys");
}

#[rstest]
#[tokio::test]
async fn fresh_logical_entries_are_served_without_rebuild(harness: Harness, key: CacheKey) {
    harness
        .cache
        .set_with_logical_expiry(&key, &"warm".to_owned(), LOGICAL_TTL)
        .await
        .expect("warmed");
    assert_eq!(harness.store.written_ttl(key.as_str()), None, "no physical ttl");
    let calls = Arc::new(AtomicUsize::new(0));

    let value: Option<String> = harness
        .cache
        .get_with_logical_expiry(&key, LOGICAL_TTL, counted(&calls, Some("new")))
        .await
        .expect("read");

    assert_eq!(value.as_deref(), Some("warm"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test]
async fn stale_entries_are_served_while_a_slow_rebuild_runs(harness: Harness, key: CacheKey) {
    harness
        .cache
        .set_with_logical_expiry(&key, &"stale".to_owned(), LOGICAL_TTL)
        .await
        .expect("warmed");
    harness.clock.advance_seconds(30);

    let calls = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = oneshot::channel::<()>();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let loader_calls = calls.clone();
    let slow_loader = move || async move {
        loader_calls.fetch_add(1, Ordering::SeqCst);
        let _ = started_tx.send(());
        let _ = release_rx.await;
        Ok::<_, Infallible>(Some("fresh".to_owned()))
    };

    let first: Option<String> = tokio::time::timeout(
        Duration::from_millis(200),
        harness
            .cache
            .get_with_logical_expiry(&key, LOGICAL_TTL, slow_loader),
    )
    .await
    .expect("read never waits on the rebuild")
    .expect("read");
    let second: Option<String> = harness
        .cache
        .get_with_logical_expiry(&key, LOGICAL_TTL, counted(&calls, Some("other")))
        .await
        .expect("read");

    tokio::time::timeout(Duration::from_secs(1), started_rx)
        .await
        .expect("background rebuild started")
        .expect("loader signalled");

    assert_eq!(first.as_deref(), Some("stale"));
    assert_eq!(second.as_deref(), Some("stale"));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "only the lock winner rebuilds");

    release_tx.send(()).expect("rebuild waiting");
    let refreshed = wait_for_value(&harness.cache, &key, "fresh").await;
    assert!(refreshed, "rebuild wrote the new value");
    assert_eq!(harness.store.peek("lock:rebuild:cache:shop:1"), None);
}

#[rstest]
#[tokio::test]
async fn failed_rebuilds_release_the_lock_and_keep_the_stale_value(
    harness: Harness,
    key: CacheKey,
) {
    harness
        .cache
        .set_with_logical_expiry(&key, &"stale".to_owned(), LOGICAL_TTL)
        .await
        .expect("warmed");
    harness.clock.advance_seconds(30);

    let value: Option<String> = harness
        .cache
        .get_with_logical_expiry(&key, LOGICAL_TTL, || async {
            Err::<Option<String>, _>("database down")
        })
        .await
        .expect("read");
    assert_eq!(value.as_deref(), Some("stale"));

    for _ in 0..100 {
        if harness.store.peek("lock:rebuild:cache:shop:1").is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(harness.store.peek("lock:rebuild:cache:shop:1"), None);
    let still_stale: Option<String> = harness
        .cache
        .get_with_logical_expiry(&key, LOGICAL_TTL, || async {
            Err::<Option<String>, _>("database down")
        })
        .await
        .expect("read");
    assert_eq!(still_stale.as_deref(), Some("stale"));
}

#[rstest]
#[tokio::test]
async fn saturated_rebuild_pool_skips_the_rebuild_and_frees_the_lock() {
    let config = CachePolicyConfig {
        rebuild_concurrency: 1,
        ..CachePolicyConfig::default()
    };
    let harness = harness_with(config, Arc::new(RecordingSleeper::default()));
    let busy = CacheKey::new("cache:shop:1").expect("valid key");
    let starved = CacheKey::new("cache:shop:2").expect("valid key");
    for key in [&busy, &starved] {
        harness
            .cache
            .set_with_logical_expiry(key, &"stale".to_owned(), LOGICAL_TTL)
            .await
            .expect("warmed");
    }
    harness.clock.advance_seconds(30);

    let (_hold_tx, hold_rx) = oneshot::channel::<()>();
    let _: Option<String> = harness
        .cache
        .get_with_logical_expiry(&busy, LOGICAL_TTL, move || async move {
            let _ = hold_rx.await;
            Ok::<_, Infallible>(Some("fresh".to_owned()))
        })
        .await
        .expect("read");

    let calls = Arc::new(AtomicUsize::new(0));
    let value: Option<String> = harness
        .cache
        .get_with_logical_expiry(&starved, LOGICAL_TTL, counted(&calls, Some("fresh")))
        .await
        .expect("read");

    assert_eq!(value.as_deref(), Some("stale"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.store.peek("lock:rebuild:cache:shop:2"), None);
}

#[rstest]
#[tokio::test]
async fn invalidate_removes_the_record(harness: Harness, key: CacheKey) {
    harness
        .cache
        .set(&key, &"value".to_owned(), TTLS.ttl)
        .await
        .expect("written");

    assert!(harness.cache.invalidate(&key).await.expect("deleted"));
    assert!(!harness.cache.invalidate(&key).await.expect("already gone"));
}

#[rstest]
#[tokio::test]
async fn rebuilds_accept_values_that_are_not_sync(harness: Harness, key: CacheKey) {
    harness
        .cache
        .set_with_logical_expiry(&key, &Cell::new(1_u32), LOGICAL_TTL)
        .await
        .expect("warmed");
    harness.clock.advance_seconds(30);

    let stale: Option<Cell<u32>> = harness
        .cache
        .get_with_logical_expiry(&key, LOGICAL_TTL, || async {
            Ok::<_, Infallible>(Some(Cell::new(2_u32)))
        })
        .await
        .expect("read");
    assert_eq!(stale.map(Cell::into_inner), Some(1));

    let mut refreshed = false;
    for _ in 0..100 {
        let current: Option<Cell<u32>> = harness
            .cache
            .get_with_logical_expiry(&key, LOGICAL_TTL, || async {
                Ok::<_, Infallible>(None::<Cell<u32>>)
            })
            .await
            .expect("read");
        if current.map(Cell::into_inner) == Some(2) {
            refreshed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(refreshed, "rebuild wrote the new value");
}

async fn wait_for_value(cache: &CacheCoordinator, key: &CacheKey, expected: &str) -> bool {
    for _ in 0..100 {
        let value: Option<String> = cache
            .get_with_logical_expiry(key, LOGICAL_TTL, || async {
                Ok::<_, Infallible>(None::<String>)
            })
            .await
            .unwrap_or(None);
        if value.as_deref() == Some(expected) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
