//! Cache façade: versioned two-tier reads and broadcast invalidation.
//!
//! ## Read path
//!
//! ```text
//! get(ns, subkey, loader)
//!   → version (local marker or store)    unavailable → loader (uncached)
//!   → L1 (moka)                          hit → return, no I/O
//!   → L2 (shared store)                  hit → backfill L1 → return
//!                                        unavailable → loader (uncached)
//!   → lease on cache:lock:{key}
//!        won  → loader → L2 + L1 → release
//!        lost → back off, re-check L1/L2, retry lease (bounded)
//!               budget exhausted → loader (uncached)
//! ```
//!
//! ## Invalidation
//!
//! `invalidate(ns)` bumps the namespace version at the store, drops the local
//! L1 segment and publishes an event. Old keys are never deleted from L2;
//! nothing reads them after the bump and they expire on their own TTL.
//!
//! Cache failures never fail a read that the loader alone could serve.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use unicache_core::key::{key_pattern, validate_component};
use unicache_core::{
    ChangeKind, CounterStore, InvalidationBus, InvalidationEvent, KeyValueStore, LockStore,
    MemoryBus, MemoryStore, Subscription, VersionedKey, origin_id,
};

use crate::config::{CacheSettings, LockConfig};
use crate::error::{CacheError, bounded};
use crate::format::ValueFormat;
use crate::local::LocalTier;
use crate::lock::DistributedLock;
use crate::namespace::NamespaceRegistry;
use crate::shared::SharedTier;
use crate::version::VersionStore;

/// How a read was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPath {
    L1Hit,
    /// Served from the shared tier and copied into L1.
    L2Hit,
    /// This caller won the lease and ran the loader.
    MissLockWon,
    /// Another caller held the lease; its result showed up while waiting.
    MissLockLost,
    /// Loader ran without caching.
    Fallback(FallbackReason),
}

impl ReadPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L1Hit => "l1_hit",
            Self::L2Hit => "l2_hit",
            Self::MissLockWon => "miss_lock_won",
            Self::MissLockLost => "miss_lock_lost",
            Self::Fallback(_) => "miss_fallback",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    VersionUnavailable,
    InvalidKey,
    SharedTierUnavailable,
    LockUnavailable,
    LockBudgetExhausted,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VersionUnavailable => "version_unavailable",
            Self::InvalidKey => "invalid_key",
            Self::SharedTierUnavailable => "shared_tier_unavailable",
            Self::LockUnavailable => "lock_unavailable",
            Self::LockBudgetExhausted => "lock_budget_exhausted",
        }
    }
}

/// A value together with the path that produced it.
#[derive(Debug, Clone)]
pub struct Lookup<T> {
    pub value: T,
    pub path: ReadPath,
    /// Versioned key of the entry; `None` when no version could be resolved.
    pub key: Option<VersionedKey>,
}

impl<T> Lookup<T> {
    fn cached(value: T, path: ReadPath, key: VersionedKey) -> Self {
        Self {
            value,
            path,
            key: Some(key),
        }
    }
}

/// Where the shared primitives live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// In-process store: single instance, no cross-process coordination.
    #[default]
    Memory,
    Redis,
}

impl CacheMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        }
    }
}

/// Read-only view of one namespace for admin tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceStats {
    pub namespace: String,
    pub declared: bool,
    /// `None` when the version store could not be reached.
    pub version: Option<u64>,
    pub key_pattern: Option<String>,
    pub l1_entries: u64,
}

static INSTANCE_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct CacheOrchestrator {
    registry: Arc<NamespaceRegistry>,
    versions: VersionStore,
    local: LocalTier,
    shared: SharedTier,
    lock: DistributedLock,
    bus: Arc<dyn InvalidationBus>,
    format: ValueFormat,
    lock_config: LockConfig,
    operation_timeout: Duration,
    origin: String,
    mode: CacheMode,
    subscription: Mutex<Option<Subscription>>,
}

impl CacheOrchestrator {
    pub fn builder() -> CacheOrchestratorBuilder {
        CacheOrchestratorBuilder::new()
    }

    /// Read through the cache with the namespace's TTL policy.
    pub async fn get<T, E, F, Fut>(&self, namespace: &str, subkey: &str, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send,
        E: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        self.lookup(namespace, subkey, None, loader)
            .await
            .map(|lookup| lookup.value)
    }

    /// Read through the cache with an explicit TTL for both tiers.
    pub async fn get_with_ttl<T, E, F, Fut>(
        &self,
        namespace: &str,
        subkey: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send,
        E: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        self.lookup(namespace, subkey, Some(ttl), loader)
            .await
            .map(|lookup| lookup.value)
    }

    /// Like [`get`](Self::get), also reporting which path served the value.
    ///
    /// Loader errors are returned unchanged and never cached.
    pub async fn lookup<T, E, F, Fut>(
        &self,
        namespace: &str,
        subkey: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<Lookup<T>, E>
    where
        T: Serialize + DeserializeOwned + Send,
        E: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let result = self.resolve(namespace, subkey, ttl, loader).await;
        if let Ok(lookup) = &result {
            crate::metrics::record_read(namespace, lookup.path);
            tracing::debug!(
                namespace = %namespace,
                subkey = %subkey,
                path = lookup.path.as_str(),
                "cache read"
            );
        }
        result
    }

    async fn resolve<T, E, F, Fut>(
        &self,
        namespace: &str,
        subkey: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<Lookup<T>, E>
    where
        T: Serialize + DeserializeOwned + Send,
        E: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let version = match self.versions.get_current_version(namespace).await {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "version store unavailable, reading uncached");
                return self
                    .fallback(namespace, None, FallbackReason::VersionUnavailable, loader)
                    .await;
            }
        };

        let key = match VersionedKey::new(namespace, version, subkey) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "uncacheable key, reading uncached");
                return self
                    .fallback(namespace, None, FallbackReason::InvalidKey, loader)
                    .await;
            }
        };

        let policy = self.registry.policy(namespace);
        let l1_ttl = ttl.unwrap_or(policy.l1_ttl);
        let l2_ttl = ttl.unwrap_or(policy.l2_ttl);

        if let Some(value) = self.read_local(&key).await {
            return Ok(Lookup::cached(value, ReadPath::L1Hit, key));
        }

        match self.read_shared(&key, l1_ttl).await {
            Ok(Some(value)) => return Ok(Lookup::cached(value, ReadPath::L2Hit, key)),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "shared tier unavailable, reading uncached");
                return self
                    .fallback(namespace, Some(key), FallbackReason::SharedTierUnavailable, loader)
                    .await;
            }
        }

        let lock_key = key.lock_key();
        let lease = self.lock_config.lease();
        let mut backoff = self.lock_config.retry_backoff();
        let mut attempt = 0;
        loop {
            match self.lock.try_acquire(&lock_key, lease).await {
                Ok(true) => {
                    return self.compute(key, &lock_key, l1_ttl, l2_ttl, loader).await;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "lock store unavailable, reading uncached");
                    return self
                        .fallback(namespace, Some(key), FallbackReason::LockUnavailable, loader)
                        .await;
                }
            }

            if attempt >= self.lock_config.retry_attempts {
                break;
            }
            attempt += 1;
            crate::metrics::record_lock_contention(namespace);
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2).min(self.lock_config.max_backoff());

            if let Some(value) = self.read_local(&key).await {
                return Ok(Lookup::cached(value, ReadPath::MissLockLost, key));
            }
            match self.read_shared(&key, l1_ttl).await {
                Ok(Some(value)) => return Ok(Lookup::cached(value, ReadPath::MissLockLost, key)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "shared tier unavailable, reading uncached");
                    return self
                        .fallback(namespace, Some(key), FallbackReason::SharedTierUnavailable, loader)
                        .await;
                }
            }
        }

        tracing::debug!(key = %key, attempts = attempt, "lease budget exhausted, reading uncached");
        self.fallback(namespace, Some(key), FallbackReason::LockBudgetExhausted, loader)
            .await
    }

    /// Lease held: compute, store in both tiers, release.
    async fn compute<T, E, F, Fut>(
        &self,
        key: VersionedKey,
        lock_key: &str,
        l1_ttl: Duration,
        l2_ttl: Duration,
        loader: F,
    ) -> Result<Lookup<T>, E>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // The previous holder may have finished between our miss and our acquisition.
        if let Ok(Some(value)) = self.read_shared(&key, l1_ttl).await {
            self.release(lock_key).await;
            return Ok(Lookup::cached(value, ReadPath::L2Hit, key));
        }

        let value = match loader().await {
            Ok(value) => value,
            Err(e) => {
                self.release(lock_key).await;
                return Err(e);
            }
        };

        match self.format.encode(&value) {
            Ok(bytes) => {
                if let Err(e) = self.shared.put(&key, &bytes, l2_ttl).await {
                    tracing::warn!(key = %key, error = %e, "failed to write shared tier");
                }
                self.local.put(&key, Arc::new(bytes), l1_ttl).await;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "value not serializable, returned uncached");
            }
        }

        self.release(lock_key).await;
        Ok(Lookup::cached(value, ReadPath::MissLockWon, key))
    }

    async fn fallback<T, E, F, Fut>(
        &self,
        namespace: &str,
        key: Option<VersionedKey>,
        reason: FallbackReason,
        loader: F,
    ) -> Result<Lookup<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        crate::metrics::record_degraded(namespace, reason);
        let value = loader().await?;
        Ok(Lookup {
            value,
            path: ReadPath::Fallback(reason),
            key,
        })
    }

    async fn read_local<T: DeserializeOwned>(&self, key: &VersionedKey) -> Option<T> {
        let bytes = self.local.get(key).await?;
        match self.format.decode(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "undecodable L1 entry, treating as miss");
                crate::metrics::record_decode_error(key.namespace(), "l1");
                self.local.evict_key(key).await;
                None
            }
        }
    }

    /// L2 lookup with L1 backfill. Undecodable bytes count as a miss.
    async fn read_shared<T: DeserializeOwned>(
        &self,
        key: &VersionedKey,
        l1_ttl: Duration,
    ) -> Result<Option<T>, unicache_core::StoreError> {
        let Some(bytes) = self.shared.get(key).await? else {
            return Ok(None);
        };
        match self.format.decode(&bytes) {
            Ok(value) => {
                self.local.put(key, Arc::new(bytes), l1_ttl).await;
                Ok(Some(value))
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "undecodable L2 entry, treating as miss");
                crate::metrics::record_decode_error(key.namespace(), "l2");
                Ok(None)
            }
        }
    }

    async fn release(&self, lock_key: &str) {
        if let Err(e) = self.lock.release(lock_key).await {
            tracing::warn!(lock = %lock_key, error = %e, "failed to release lease, it will expire");
        }
    }

    /// Supersede every entry of `namespace` and return the new version.
    ///
    /// Fails if the version could not be bumped. A failed broadcast is only
    /// logged: peers pick up the new version on their next marker refresh.
    pub async fn invalidate(&self, namespace: &str) -> Result<u64, CacheError> {
        validate_component("namespace", namespace)?;

        let new_version = self.versions.increment_version(namespace).await?;
        // Evict locally right away instead of waiting for our own event.
        self.local.evict_namespace(namespace);

        let event = InvalidationEvent::namespace_bumped(namespace, new_version)
            .with_origin(self.origin.clone());
        self.publish(&event).await;

        crate::metrics::record_invalidation(namespace, event.change.as_str());
        tracing::info!(namespace = %namespace, version = new_version, "cache namespace invalidated");
        Ok(new_version)
    }

    /// Drop one subkey at the current version from both tiers.
    pub async fn invalidate_key(&self, namespace: &str, subkey: &str) -> Result<(), CacheError> {
        let version = self.versions.get_current_version(namespace).await?;
        let key = VersionedKey::new(namespace, version, subkey)?;

        self.local.evict_key(&key).await;
        let existed = self.shared.delete(&key).await?;

        let event = InvalidationEvent::key_dropped(namespace, subkey, version)
            .with_origin(self.origin.clone());
        self.publish(&event).await;

        crate::metrics::record_invalidation(namespace, event.change.as_str());
        tracing::info!(key = %key, existed, "cache key invalidated");
        Ok(())
    }

    async fn publish(&self, event: &InvalidationEvent) {
        if let Err(e) = bounded("bus.publish", self.operation_timeout, self.bus.publish(event)).await {
            tracing::warn!(
                namespace = %event.namespace,
                error = %e,
                "failed to publish invalidation, peers converge on version refresh"
            );
        }
    }

    /// Subscribe this instance to invalidation events from its peers.
    pub fn start_listener(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let subscription = self.bus.subscribe(Arc::new(move |event: InvalidationEvent| {
            if let Some(cache) = weak.upgrade() {
                cache.handle_event(event);
            }
        }));

        if let Ok(mut slot) = self.subscription.lock() {
            *slot = Some(subscription);
        }
        tracing::info!(origin = %self.origin, mode = self.mode.as_str(), "cache invalidation listener started");
    }

    fn handle_event(self: &Arc<Self>, event: InvalidationEvent) {
        if event.origin_id == self.origin {
            return;
        }
        let namespace = event.namespace.as_str();

        if self.versions.observe(namespace, event.new_version) {
            self.local.evict_namespace(namespace);
            tracing::debug!(namespace = %namespace, version = event.new_version, "L1 evicted on peer invalidation");
        } else if event.change == ChangeKind::AllInNamespace {
            tracing::debug!(
                namespace = %namespace,
                version = event.new_version,
                "ignoring superseded invalidation event"
            );
        }

        if let ChangeKind::SingleKey { subkey } = &event.change {
            match VersionedKey::new(namespace, event.new_version, subkey.as_str()) {
                Ok(key) => {
                    let cache = Arc::clone(self);
                    tokio::spawn(async move { cache.local.evict_key(&key).await });
                }
                Err(e) => {
                    tracing::warn!(namespace = %namespace, error = %e, "invalid key in invalidation event");
                }
            }
        }
    }

    /// Raw shared-tier value decoded as JSON, for admin tooling.
    pub async fn peek(&self, namespace: &str, subkey: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let version = self.versions.get_current_version(namespace).await?;
        let key = VersionedKey::new(namespace, version, subkey)?;
        match self.shared.get(&key).await? {
            Some(bytes) => Ok(Some(self.format.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Current version of a namespace.
    pub async fn version(&self, namespace: &str) -> Result<u64, CacheError> {
        Ok(self.versions.get_current_version(namespace).await?)
    }

    pub async fn namespace_stats(&self) -> Vec<NamespaceStats> {
        let mut stats = Vec::new();
        for name in self.registry.names() {
            stats.push(self.stats_for(name).await);
        }
        stats
    }

    pub async fn stats_for(&self, namespace: &str) -> NamespaceStats {
        let version = match self.versions.get_current_version(namespace).await {
            Ok(version) => Some(version),
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "version unavailable for stats");
                None
            }
        };
        NamespaceStats {
            namespace: namespace.to_string(),
            declared: self.registry.is_declared(namespace),
            version,
            key_pattern: version.map(|v| key_pattern(namespace, v)),
            l1_entries: self.local.entry_count(namespace).await,
        }
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn is_listening(&self) -> bool {
        self.subscription
            .lock()
            .map(|slot| slot.as_ref().is_some_and(Subscription::is_active))
            .unwrap_or(false)
    }
}

/// Builder for [`CacheOrchestrator`].
///
/// Any primitive left unset is served by one in-process [`MemoryStore`] /
/// [`MemoryBus`].
#[derive(Default)]
pub struct CacheOrchestratorBuilder {
    settings: Option<CacheSettings>,
    counters: Option<Arc<dyn CounterStore>>,
    values: Option<Arc<dyn KeyValueStore>>,
    locks: Option<Arc<dyn LockStore>>,
    bus: Option<Arc<dyn InvalidationBus>>,
    mode: CacheMode,
}

impl CacheOrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut self, settings: CacheSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_counter_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.counters = Some(store);
        self
    }

    pub fn with_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.values = Some(store);
        self
    }

    pub fn with_lock_store(mut self, store: Arc<dyn LockStore>) -> Self {
        self.locks = Some(store);
        self
    }

    pub fn with_bus(mut self, bus: Arc<dyn InvalidationBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Use one in-process store for counters, values and leases.
    pub fn with_memory_store(self, store: MemoryStore) -> Self {
        let store = Arc::new(store);
        self.with_counter_store(store.clone())
            .with_value_store(store.clone())
            .with_lock_store(store)
    }

    pub fn with_mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Result<Arc<CacheOrchestrator>, CacheError> {
        let settings = self.settings.unwrap_or_default();
        let registry = Arc::new(NamespaceRegistry::from_settings(&settings)?);
        let timeout = settings.timeouts.operation();
        let origin = format!(
            "{}-{}",
            origin_id(),
            INSTANCE_SEQ.fetch_add(1, Ordering::Relaxed)
        );

        let memory = MemoryStore::new();
        let counters: Arc<dyn CounterStore> = match self.counters {
            Some(store) => store,
            None => Arc::new(memory.clone()),
        };
        let values: Arc<dyn KeyValueStore> = match self.values {
            Some(store) => store,
            None => Arc::new(memory.clone()),
        };
        let locks: Arc<dyn LockStore> = match self.locks {
            Some(store) => store,
            None => Arc::new(memory),
        };
        let bus: Arc<dyn InvalidationBus> = match self.bus {
            Some(bus) => bus,
            None => Arc::new(MemoryBus::new()),
        };

        Ok(Arc::new(CacheOrchestrator {
            versions: VersionStore::new(counters, settings.timeouts.version_refresh(), timeout),
            local: LocalTier::new(registry.clone()),
            shared: SharedTier::new(values, timeout),
            lock: DistributedLock::new(locks, origin.clone(), timeout),
            bus,
            format: settings.format,
            lock_config: settings.lock.clone(),
            operation_timeout: timeout,
            origin,
            mode: self.mode,
            subscription: Mutex::new(None),
            registry,
        }))
    }
}
