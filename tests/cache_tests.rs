mod common;

use std::time::Duration;

use bgh_smart::{CacheOptions, CacheState, Error, HeatingCoolingState, StatusCache};
use common::FakeDevice;
use tokio::time::sleep;

fn cache_for(device: &std::sync::Arc<FakeDevice>) -> StatusCache {
    StatusCache::new(device.clone(), CacheOptions::default())
}

#[tokio::test(start_paused = true)]
async fn reads_within_ttl_fetch_once() {
    let device = FakeDevice::new();
    let cache = cache_for(&device);

    for _ in 0..5 {
        let status = cache.read().await.unwrap();
        assert_eq!(status.mode, HeatingCoolingState::Heat);
        sleep(Duration::from_secs(5)).await;
    }
    assert_eq!(device.status_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn ttl_runs_from_fetch_completion() {
    let device = FakeDevice::new();
    let cache = cache_for(&device);

    cache.read().await.unwrap();
    assert_eq!(device.status_calls(), 1);
    assert_eq!(cache.state(), CacheState::Fresh);

    sleep(Duration::from_secs(10)).await;
    cache.read().await.unwrap();
    assert_eq!(device.status_calls(), 1, "t=10 should be a cache hit");

    sleep(Duration::from_secs(21)).await;
    cache.read().await.unwrap();
    assert_eq!(device.status_calls(), 2, "t=31 should refetch");
}

#[tokio::test(start_paused = true)]
async fn concurrent_reads_share_one_fetch() {
    let device = FakeDevice::new();
    device.set_delay(Duration::from_secs(3));
    let cache = cache_for(&device);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.read().await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(device.status_calls(), 1);
    assert!(results.iter().all(|s| *s == results[0]));
}

#[tokio::test(start_paused = true)]
async fn concurrent_reads_share_one_failure() {
    let device = FakeDevice::new();
    device.set_delay(Duration::from_secs(1));
    device.fail_next_status(1);
    let cache = cache_for(&device);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.read().await })
        })
        .collect();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        match err {
            Error::Fetch(inner) => assert!(matches!(*inner, Error::Protocol(_))),
            other => panic!("expected Fetch, got {other:?}"),
        }
    }
    assert_eq!(device.status_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failure_resets_entry_and_next_read_retries_once() {
    let device = FakeDevice::new();
    device.fail_next_status(1);
    let cache = cache_for(&device);

    assert!(cache.read().await.is_err());
    assert_eq!(cache.state(), CacheState::Empty);

    cache.read().await.unwrap();
    cache.read().await.unwrap();
    assert_eq!(device.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn unmodeled_device_mode_reads_as_off() {
    let device = FakeDevice::new();
    device.set_status(Some(3), 26.0, 22.0);
    let cache = cache_for(&device);

    let status = cache.read().await.unwrap();
    assert_eq!(status.mode, HeatingCoolingState::Off);
    assert_eq!(status.temperature.celsius(), 26.0);
}

#[tokio::test(start_paused = true)]
async fn absent_device_mode_reads_as_off() {
    let device = FakeDevice::new();
    device.set_status(None, 26.0, 22.0);
    let cache = cache_for(&device);

    assert_eq!(cache.read().await.unwrap().mode, HeatingCoolingState::Off);
}

#[tokio::test(start_paused = true)]
async fn invalidate_forces_refetch() {
    let device = FakeDevice::new();
    let cache = cache_for(&device);

    cache.read().await.unwrap();
    cache.invalidate();
    assert_eq!(cache.state(), CacheState::Empty);
    cache.read().await.unwrap();
    assert_eq!(device.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn invalidate_mid_fetch_answers_but_does_not_cache() {
    let device = FakeDevice::new();
    device.set_delay(Duration::from_secs(5));
    let cache = cache_for(&device);

    let reader = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.read().await })
    };
    sleep(Duration::from_secs(1)).await;
    assert_eq!(cache.state(), CacheState::Fetching);
    cache.invalidate();
    assert_eq!(cache.state(), CacheState::Fetching);

    reader.await.unwrap().unwrap();
    assert_eq!(cache.state(), CacheState::Empty);
    assert!(cache.peek().is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_device_times_out() {
    let device = FakeDevice::new();
    device.set_delay(Duration::from_secs(60));
    let cache = StatusCache::new(
        device.clone(),
        CacheOptions {
            device_timeout: Duration::from_secs(10),
            wait_timeout: Duration::from_secs(120),
            ..CacheOptions::default()
        },
    );

    let err = cache.read().await.unwrap_err();
    match err {
        Error::Fetch(inner) => assert!(matches!(*inner, Error::Timeout)),
        other => panic!("expected Fetch(Timeout), got {other:?}"),
    }
    assert_eq!(cache.state(), CacheState::Empty);
}

#[tokio::test(start_paused = true)]
async fn waiter_gives_up_but_fetch_completes() {
    let device = FakeDevice::new();
    device.set_delay(Duration::from_secs(20));
    let cache = StatusCache::new(
        device.clone(),
        CacheOptions {
            device_timeout: Duration::from_secs(60),
            wait_timeout: Duration::from_secs(5),
            ..CacheOptions::default()
        },
    );

    let err = cache.read().await.unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert_eq!(cache.state(), CacheState::Fetching);

    sleep(Duration::from_secs(20)).await;
    assert_eq!(cache.state(), CacheState::Fresh);
    cache.read().await.unwrap();
    assert_eq!(device.status_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_read_does_not_strand_fetch() {
    let device = FakeDevice::new();
    device.set_delay(Duration::from_secs(5));
    let cache = cache_for(&device);

    let reader = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.read().await })
    };
    sleep(Duration::from_secs(1)).await;
    reader.abort();

    sleep(Duration::from_secs(10)).await;
    assert_eq!(cache.state(), CacheState::Fresh);
    cache.read().await.unwrap();
    assert_eq!(device.status_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn evict_expired_only_touches_stale_values() {
    let device = FakeDevice::new();
    let cache = cache_for(&device);

    assert!(!cache.evict_expired());
    cache.read().await.unwrap();
    assert!(!cache.evict_expired());
    assert!(cache.peek().is_some());

    sleep(Duration::from_secs(31)).await;
    assert_eq!(cache.state(), CacheState::Expired);
    assert!(cache.peek().is_none());
    assert!(cache.evict_expired());
    assert_eq!(cache.state(), CacheState::Empty);
}

#[tokio::test(start_paused = true)]
async fn sweeper_evicts_in_background() {
    let device = FakeDevice::new();
    let cache = cache_for(&device);
    let sweeper = cache.spawn_sweeper(Duration::from_secs(5));

    cache.read().await.unwrap();
    sleep(Duration::from_secs(40)).await;
    assert_eq!(cache.state(), CacheState::Empty);
    sweeper.abort();
}
