//! Integration tests for the Redis store protocol implementation.
//!
//! Tests use testcontainers to spin up a real Redis instance.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;
use unicache_core::{
    CounterStore, InvalidationBus, InvalidationEvent, KeyValueStore, LockStore,
};
use unicache_redis::{RedisConfig, connect};

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

async fn config() -> RedisConfig {
    RedisConfig {
        enabled: true,
        url: get_redis_url().await,
        pool_size: 16,
        timeout_ms: 5000,
    }
}

#[tokio::test]
async fn test_version_counter_starts_at_one() {
    let (store, _) = connect(&config().await).await.unwrap();
    let key = format!("cache:version:{}", unique("ns"));

    assert_eq!(store.get_or_init(&key, 1).await.unwrap(), 1);
    assert_eq!(store.get_or_init(&key, 1).await.unwrap(), 1);
    assert_eq!(store.increment(&key).await.unwrap(), 2);
    assert_eq!(store.get_or_init(&key, 1).await.unwrap(), 2);
}

#[tokio::test]
async fn test_increment_by_reseeds_counter() {
    let (store, _) = connect(&config().await).await.unwrap();
    let key = format!("cache:version:{}", unique("ns"));

    assert_eq!(store.get_or_init(&key, 1).await.unwrap(), 1);
    assert_eq!(store.increment_by(&key, 7).await.unwrap(), 8);
    assert_eq!(store.increment(&key).await.unwrap(), 9);
}

#[tokio::test]
async fn test_concurrent_increments_from_two_pools() {
    let cfg = config().await;
    let (a, _) = connect(&cfg).await.unwrap();
    let (b, _) = connect(&cfg).await.unwrap();
    let key = format!("cache:version:{}", unique("ns"));
    let initial = a.get_or_init(&key, 1).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..40 {
        let store = if i % 2 == 0 { a.clone() } else { b.clone() };
        let key = key.clone();
        tasks.push(tokio::spawn(async move { store.increment(&key).await.unwrap() }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(a.get_or_init(&key, 1).await.unwrap(), initial + 40);
}

#[tokio::test]
async fn test_value_set_get_delete() {
    let (store, _) = connect(&config().await).await.unwrap();
    let key = unique("i18n:v1");

    assert_eq!(store.get(&key).await.unwrap(), None);
    store
        .set(&key, b"{\"hello\":\"salom\"}", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(
        store.get(&key).await.unwrap(),
        Some(b"{\"hello\":\"salom\"}".to_vec())
    );
    assert!(store.delete(&key).await.unwrap());
    assert!(!store.delete(&key).await.unwrap());
}

#[tokio::test]
async fn test_value_expires() {
    let (store, _) = connect(&config().await).await.unwrap();
    let key = unique("menu:v1");

    store.set(&key, b"x", Duration::from_millis(200)).await.unwrap();
    assert!(store.get(&key).await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(store.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_abandoned_lease_is_acquirable_after_expiry() {
    let (store, _) = connect(&config().await).await.unwrap();
    let key = format!("cache:lock:{}", unique("i18n:v1"));
    let lease = Duration::from_secs(2);

    assert!(store.set_if_absent(&key, "holder-a", lease).await.unwrap());
    assert!(!store.set_if_absent(&key, "holder-b", lease).await.unwrap());

    // Holder "a" never releases.
    let started = tokio::time::Instant::now();
    loop {
        if store.set_if_absent(&key, "holder-b", lease).await.unwrap() {
            break;
        }
        assert!(
            started.elapsed() < lease + Duration::from_millis(500),
            "lease did not expire in time"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(started.elapsed() >= Duration::from_millis(1_500));
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let (store, _) = connect(&config().await).await.unwrap();
    let key = format!("cache:lock:{}", unique("menu:v1"));

    store.remove(&key).await.unwrap();
    assert!(
        store
            .set_if_absent(&key, "holder", Duration::from_secs(5))
            .await
            .unwrap()
    );
    store.remove(&key).await.unwrap();
    store.remove(&key).await.unwrap();
    assert!(
        store
            .set_if_absent(&key, "other", Duration::from_secs(5))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_pubsub_delivers_events() {
    let (_, bus) = connect(&config().await).await.unwrap();
    let namespace = unique("ns");
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let expected = namespace.clone();
    let _subscription = bus.subscribe(Arc::new(move |event: InvalidationEvent| {
        if event.namespace == expected {
            sink.lock().unwrap().push(event.new_version);
        }
    }));

    // Give the listener time to SUBSCRIBE before publishing.
    tokio::time::sleep(Duration::from_millis(500)).await;
    bus.publish(&InvalidationEvent::namespace_bumped(&namespace, 2))
        .await
        .unwrap();

    for _ in 0..50 {
        if !seen.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(*seen.lock().unwrap(), vec![2]);
}

#[tokio::test]
async fn test_connect_fails_for_unreachable_server() {
    let cfg = RedisConfig {
        enabled: true,
        url: "redis://127.0.0.1:1".to_string(),
        pool_size: 2,
        timeout_ms: 500,
    };
    assert!(connect(&cfg).await.is_err());
}
