//! Best-effort distributed lease used to serialize recomputation.
//!
//! Acquisition is a single set-if-absent with a TTL; there is no fencing or
//! consensus. If a holder stalls past its lease, a second instance may
//! recompute the same entry. Loaders are idempotent, so the cost is duplicate
//! work, never a wrong value.

use std::sync::Arc;
use std::time::Duration;

use unicache_core::{LockStore, StoreError};
use uuid::Uuid;

use crate::error::bounded;

pub struct DistributedLock {
    store: Arc<dyn LockStore>,
    holder_prefix: String,
    timeout: Duration,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn LockStore>, holder_prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            holder_prefix: holder_prefix.into(),
            timeout,
        }
    }

    /// Try to take the lease on `lock_key`. Returns true iff this caller holds it.
    pub async fn try_acquire(&self, lock_key: &str, lease: Duration) -> Result<bool, StoreError> {
        let token = format!("{}/{}", self.holder_prefix, Uuid::new_v4().simple());
        let acquired = bounded(
            "lock.acquire",
            self.timeout,
            self.store.set_if_absent(lock_key, &token, lease),
        )
        .await?;

        if acquired {
            tracing::debug!(lock = %lock_key, holder = %token, lease_ms = lease.as_millis() as u64, "lease acquired");
        }
        Ok(acquired)
    }

    /// Drop the lease. Safe to call when not the holder or when already expired.
    pub async fn release(&self, lock_key: &str) -> Result<(), StoreError> {
        bounded("lock.release", self.timeout, self.store.remove(lock_key)).await?;
        tracing::debug!(lock = %lock_key, "lease released");
        Ok(())
    }
}
