//! L1: bounded per-instance cache.
//!
//! One moka segment per namespace, sized by the namespace policy. Segments
//! make namespace eviction a constant-time `invalidate_all` instead of a scan.
//! Entries carry their own TTL through a moka [`Expiry`], capped at
//! [`MAX_TTL`] like every other tier.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use moka::Expiry;
use moka::future::Cache;
use unicache_core::{MAX_TTL, VersionedKey};

use crate::namespace::NamespaceRegistry;

#[derive(Clone)]
struct LocalEntry {
    data: Arc<Vec<u8>>,
    ttl: Duration,
}

struct EntryTtl;

impl Expiry<String, LocalEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &LocalEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &LocalEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct LocalTier {
    segments: DashMap<String, Cache<String, LocalEntry>>,
    registry: Arc<NamespaceRegistry>,
}

impl LocalTier {
    pub fn new(registry: Arc<NamespaceRegistry>) -> Self {
        Self {
            segments: DashMap::new(),
            registry,
        }
    }

    pub async fn get(&self, key: &VersionedKey) -> Option<Arc<Vec<u8>>> {
        let segment = self.segment(key.namespace())?;
        segment.get(&key.encode()).await.map(|entry| entry.data)
    }

    pub async fn put(&self, key: &VersionedKey, data: Arc<Vec<u8>>, ttl: Duration) {
        let segment = self.segment_or_create(key.namespace());
        let ttl = ttl.min(MAX_TTL);
        segment.insert(key.encode(), LocalEntry { data, ttl }).await;
    }

    /// Drop every entry of `namespace`, whatever its version.
    pub fn evict_namespace(&self, namespace: &str) {
        if let Some(segment) = self.segment(namespace) {
            segment.invalidate_all();
            tracing::debug!(namespace = %namespace, "L1 namespace evicted");
        }
    }

    pub async fn evict_key(&self, key: &VersionedKey) {
        if let Some(segment) = self.segment(key.namespace()) {
            segment.invalidate(&key.encode()).await;
        }
    }

    /// Live entries of `namespace` (after flushing moka's pending maintenance).
    pub async fn entry_count(&self, namespace: &str) -> u64 {
        match self.segment(namespace) {
            Some(segment) => {
                segment.run_pending_tasks().await;
                segment.entry_count()
            }
            None => 0,
        }
    }

    fn segment(&self, namespace: &str) -> Option<Cache<String, LocalEntry>> {
        self.segments.get(namespace).map(|s| s.value().clone())
    }

    fn segment_or_create(&self, namespace: &str) -> Cache<String, LocalEntry> {
        if let Some(segment) = self.segment(namespace) {
            return segment;
        }
        let policy = self.registry.policy(namespace);
        self.segments
            .entry(namespace.to_string())
            .or_insert_with(|| {
                Cache::builder()
                    .max_capacity(policy.l1_max_entries)
                    .expire_after(EntryTtl)
                    .build()
            })
            .value()
            .clone()
    }
}
