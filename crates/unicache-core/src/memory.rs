//! In-process implementation of the shared store protocol.
//!
//! Used for single-instance deployments (no Redis) and as the shared store in
//! tests: several cache instances holding clones of the same [`MemoryStore`]
//! and [`MemoryBus`] behave like processes sharing one Redis.
//!
//! Expiry uses `tokio::time::Instant`, so tests running with a paused clock
//! can advance past TTLs and leases deterministically.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::event::InvalidationEvent;
use crate::store::{
    CounterStore, InvalidationBus, InvalidationHandler, KeyValueStore, LockStore, MAX_TTL,
    Subscription,
};

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl.min(MAX_TTL),
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// DashMap-backed counters, values and leases.
///
/// Cloning is cheap and clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    counters: Arc<DashMap<String, u64>>,
    values: Arc<DashMap<String, Expiring<Vec<u8>>>>,
    locks: Arc<DashMap<String, Expiring<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live (non-expired) value exists under `key`.
    pub fn contains_value(&self, key: &str) -> bool {
        self.values
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    /// Number of live values.
    pub fn value_count(&self) -> usize {
        self.values.iter().filter(|e| !e.is_expired()).count()
    }

    /// Current lease holder token, if the lease is live.
    pub fn lock_holder(&self, key: &str) -> Option<String> {
        self.locks
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }

    /// Drop expired values and leases. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.values.len() + self.locks.len();
        self.values.retain(|_, e| !e.is_expired());
        self.locks.retain(|_, e| !e.is_expired());
        before - (self.values.len() + self.locks.len())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get_or_init(&self, key: &str, initial: u64) -> Result<u64, StoreError> {
        Ok(*self.counters.entry(key.to_string()).or_insert(initial))
    }

    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        self.increment_by(key, 1).await
    }

    async fn increment_by(&self, key: &str, delta: u64) -> Result<u64, StoreError> {
        // The entry guard holds the shard lock, making read-add-write atomic.
        let mut counter = self.counters.entry(key.to_string()).or_insert(0);
        *counter = counter.saturating_add(delta);
        Ok(*counter)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(entry) = self.values.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
            drop(entry);
            self.values.remove_if(key, |_, e| e.is_expired());
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        self.values
            .insert(key.to_string(), Expiring::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .values
            .remove(key)
            .map(|(_, e)| !e.is_expired())
            .unwrap_or(false))
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        match self.locks.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(Expiring::new(token.to_string(), ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Expiring::new(token.to_string(), ttl));
                Ok(true)
            }
        }
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.locks.remove(key);
        Ok(())
    }
}

const BUS_CAPACITY: usize = 1024;

/// Broadcast-channel bus connecting every subscriber in the process.
#[derive(Clone)]
pub struct MemoryBus {
    sender: broadcast::Sender<InvalidationEvent>,
}

impl MemoryBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvalidationBus for MemoryBus {
    async fn publish(&self, event: &InvalidationEvent) -> Result<(), StoreError> {
        // No subscribers is not a failure: nobody needs to hear about it.
        let _ = self.sender.send(event.clone());
        Ok(())
    }

    fn subscribe(&self, handler: InvalidationHandler) -> Subscription {
        let mut receiver = self.sender.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => handler(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "invalidation subscriber lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Subscription::new(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_counter_starts_at_initial() {
        let store = MemoryStore::new();
        assert_eq!(store.get_or_init("cache:version:i18n", 1).await.unwrap(), 1);
        assert_eq!(store.get_or_init("cache:version:i18n", 5).await.unwrap(), 1);
        assert_eq!(store.increment("cache:version:i18n").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let store = MemoryStore::new();
        store.get_or_init("c", 1).await.unwrap();

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment("c").await.unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.get_or_init("c", 1).await.unwrap(), 65);
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_ttl() {
        let store = MemoryStore::new();
        store.set("k", b"v", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.contains_value("k"));
    }

    #[tokio::test]
    async fn test_increment_by() {
        let store = MemoryStore::new();
        assert_eq!(store.increment_by("c", 5).await.unwrap(), 5);
        assert_eq!(store.increment_by("c", 3).await.unwrap(), 8);
        assert_eq!(store.increment("c").await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_unbounded_ttl_is_clamped() {
        let store = MemoryStore::new();
        store.set("k", b"v", Duration::MAX).await.unwrap();
        assert!(store.contains_value("k"));
        assert!(store.set_if_absent("lock", "a", Duration::MAX).await.unwrap());
        assert_eq!(store.lock_holder("lock").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = MemoryStore::new();
        store.set("k", b"v", Duration::from_secs(10)).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_exclusive_until_expiry() {
        let store = MemoryStore::new();
        let lease = Duration::from_secs(2);

        assert!(store.set_if_absent("lock", "a", lease).await.unwrap());
        assert!(!store.set_if_absent("lock", "b", lease).await.unwrap());
        assert_eq!(store.lock_holder("lock").as_deref(), Some("a"));

        tokio::time::advance(Duration::from_millis(2_001)).await;
        assert!(store.set_if_absent("lock", "b", lease).await.unwrap());
        assert_eq!(store.lock_holder("lock").as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = MemoryStore::new();
        store.remove("missing").await.unwrap();
        store
            .set_if_absent("lock", "a", Duration::from_secs(5))
            .await
            .unwrap();
        store.remove("lock").await.unwrap();
        store.remove("lock").await.unwrap();
        assert!(store.lock_holder("lock").is_none());
    }

    #[tokio::test]
    async fn test_bus_delivers_to_every_subscriber() {
        let bus = MemoryBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let subs: Vec<_> = (0..2)
            .map(|_| {
                let seen = seen.clone();
                bus.subscribe(Arc::new(move |event: InvalidationEvent| {
                    seen.lock().unwrap().push(event.new_version);
                }))
            })
            .collect();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(&InvalidationEvent::namespace_bumped("menu", 3))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*seen.lock().unwrap(), vec![3, 3]);
        drop(subs);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = MemoryBus::new();
        bus.publish(&InvalidationEvent::namespace_bumped("menu", 2))
            .await
            .unwrap();
    }
}
