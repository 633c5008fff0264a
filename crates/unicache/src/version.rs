//! Per-namespace version counters.
//!
//! The authoritative counter lives in the shared store under
//! `cache:version:{namespace}`. Each instance also keeps a marker with the
//! highest version it has seen, so that reads within the refresh interval
//! need no network round trip. Markers only move forward: a late or
//! reordered invalidation event can never roll a namespace back.
//!
//! Versions handed to callers always come from the store. When the store
//! counter falls behind a marker (flushed, or a failover lost writes) it is
//! re-seeded with `INCRBY` until it is back above everything handed out.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use unicache_core::key::version_key;
use unicache_core::{CounterStore, StoreError};

use crate::error::bounded;

/// First version of every namespace.
pub const INITIAL_VERSION: u64 = 1;

#[derive(Debug, Clone, Copy)]
struct VersionMarker {
    version: u64,
    refreshed_at: Instant,
}

pub struct VersionStore {
    counter: Arc<dyn CounterStore>,
    markers: DashMap<String, VersionMarker>,
    refresh: Duration,
    timeout: Duration,
}

impl VersionStore {
    pub fn new(counter: Arc<dyn CounterStore>, refresh: Duration, timeout: Duration) -> Self {
        Self {
            counter,
            markers: DashMap::new(),
            refresh,
            timeout,
        }
    }

    /// Current version of `namespace`, creating it at 1 when absent.
    pub async fn get_current_version(&self, namespace: &str) -> Result<u64, StoreError> {
        if let Some(marker) = self.markers.get(namespace) {
            if marker.refreshed_at.elapsed() < self.refresh {
                return Ok(marker.version);
            }
        }

        let key = version_key(namespace);
        let fetched = bounded(
            "version.get",
            self.timeout,
            self.counter.get_or_init(&key, INITIAL_VERSION),
        )
        .await?;
        let version = match self.known_version(namespace) {
            Some(known) if fetched < known => self.reseed(namespace, &key, fetched, known).await?,
            _ => fetched,
        };
        self.record(namespace, version);
        Ok(version)
    }

    /// Atomically bump the version at the store and return the new value.
    pub async fn increment_version(&self, namespace: &str) -> Result<u64, StoreError> {
        let key = version_key(namespace);
        // Materialize the counter first so a never-read namespace moves 1 -> 2.
        bounded(
            "version.init",
            self.timeout,
            self.counter.get_or_init(&key, INITIAL_VERSION),
        )
        .await?;
        let mut version = bounded("version.incr", self.timeout, self.counter.increment(&key)).await?;
        if let Some(known) = self.known_version(namespace) {
            if version <= known {
                version = self.reseed(namespace, &key, version, known + 1).await?;
            }
        }
        self.record(namespace, version);
        Ok(version)
    }

    /// Record a version learned from an invalidation event.
    ///
    /// Returns true when it is newer than anything seen locally, i.e. when the
    /// caller must drop locally cached entries of the namespace.
    pub fn observe(&self, namespace: &str, version: u64) -> bool {
        match self.markers.entry(namespace.to_string()) {
            Entry::Occupied(mut occupied) => {
                let marker = occupied.get_mut();
                if version > marker.version {
                    marker.version = version;
                    marker.refreshed_at = Instant::now();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(VersionMarker {
                    version,
                    refreshed_at: Instant::now(),
                });
                true
            }
        }
    }

    /// Locally known version, without touching the store.
    pub fn known_version(&self, namespace: &str) -> Option<u64> {
        self.markers.get(namespace).map(|m| m.version)
    }

    /// Raise the store counter from `current` to at least `target`.
    async fn reseed(
        &self,
        namespace: &str,
        key: &str,
        current: u64,
        target: u64,
    ) -> Result<u64, StoreError> {
        tracing::warn!(
            namespace = %namespace,
            store_version = current,
            reseed_to = target,
            "version counter behind local marker, re-seeding"
        );
        bounded(
            "version.reseed",
            self.timeout,
            self.counter.increment_by(key, target - current),
        )
        .await
    }

    fn record(&self, namespace: &str, version: u64) {
        let mut marker = self
            .markers
            .entry(namespace.to_string())
            .or_insert(VersionMarker {
                version,
                refreshed_at: Instant::now(),
            });
        // Concurrent calls may finish out of order.
        marker.version = marker.version.max(version);
        marker.refreshed_at = Instant::now();
    }
}
