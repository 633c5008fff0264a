//! Shared store protocol.
//!
//! The cache needs four primitives from its environment: an atomic counter,
//! get/set-with-TTL on byte values, set-if-absent with TTL for leases, and a
//! publish/subscribe channel. They are separate traits so that each can be
//! backed by a different service, although a single Redis deployment
//! satisfies all of them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::error::StoreError;
use crate::event::InvalidationEvent;

/// Longest TTL any store applies. Longer requests are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Atomically incrementable integer counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the counter, creating it with `initial` when absent.
    ///
    /// Concurrent first calls must all observe the same value.
    async fn get_or_init(&self, key: &str, initial: u64) -> Result<u64, StoreError>;

    /// Increment at the store and return the new value. Absent counters start at 0.
    async fn increment(&self, key: &str) -> Result<u64, StoreError>;

    /// Atomically add `delta` and return the new value.
    async fn increment_by(&self, key: &str, delta: u64) -> Result<u64, StoreError>;
}

/// Byte values with a time-to-live.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// Lease records for distributed mutual exclusion.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create `key` holding `token` only if absent. Returns true iff created.
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Remove `key` regardless of holder. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Callback invoked for every received invalidation event.
pub type InvalidationHandler = Arc<dyn Fn(InvalidationEvent) + Send + Sync>;

/// Fire-and-forget broadcast of invalidation events.
///
/// Delivery is at most once per connected subscriber with no replay, so
/// subscribers must treat events as hints and tolerate gaps.
#[async_trait]
pub trait InvalidationBus: Send + Sync {
    async fn publish(&self, event: &InvalidationEvent) -> Result<(), StoreError>;

    /// Start delivering events to `handler` on a background task.
    fn subscribe(&self, handler: InvalidationHandler) -> Subscription;
}

/// Handle to a running subscription. Dropping it stops delivery.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
