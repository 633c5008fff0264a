//! L2: the shared key/value tier.
//!
//! Namespace invalidation never deletes from here: superseded versions are
//! left to their TTL, which bounds growth to the number of invalidation bursts
//! within one TTL window.

use std::sync::Arc;
use std::time::Duration;

use unicache_core::{KeyValueStore, StoreError, VersionedKey};

use crate::error::bounded;

pub struct SharedTier {
    store: Arc<dyn KeyValueStore>,
    timeout: Duration,
}

impl SharedTier {
    pub fn new(store: Arc<dyn KeyValueStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn get(&self, key: &VersionedKey) -> Result<Option<Vec<u8>>, StoreError> {
        bounded("l2.get", self.timeout, self.store.get(&key.encode())).await
    }

    pub async fn put(&self, key: &VersionedKey, data: &[u8], ttl: Duration) -> Result<(), StoreError> {
        bounded("l2.set", self.timeout, self.store.set(&key.encode(), data, ttl)).await
    }

    /// Single-key invalidation only.
    pub async fn delete(&self, key: &VersionedKey) -> Result<bool, StoreError> {
        bounded("l2.delete", self.timeout, self.store.delete(&key.encode())).await
    }
}
