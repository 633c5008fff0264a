//! Unicache: versioned two-tier cache with distributed invalidation.
//!
//! Values live in a per-instance L1 (moka) in front of a shared L2. Every key
//! embeds the version of its namespace, so invalidating a namespace is a
//! single atomic counter bump plus a broadcast; no scan or delete of the
//! shared tier ever happens.
//!
//! ```ignore
//! let settings = unicache::loader::load_settings(None)?;
//! let cache = unicache::connect(settings).await?;
//!
//! let menu: Vec<MenuItem> = cache
//!     .get("menu", &subkey, || async { repo.menu_for(user).await })
//!     .await?;
//!
//! cache.invalidate("menu").await?;
//! ```

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod format;
pub mod local;
pub mod lock;
pub mod metrics;
pub mod namespace;
pub mod orchestrator;
pub mod shared;
pub mod version;
pub mod warmup;

pub use config::{
    CacheSettings, LockConfig, LoggingConfig, NamespaceConfig, NamespaceDefaults, TimeoutConfig,
    WarmupConfig, loader,
};
pub use error::CacheError;
pub use format::ValueFormat;
pub use namespace::{NamespacePolicy, NamespaceRegistry};
pub use orchestrator::{
    CacheMode, CacheOrchestrator, CacheOrchestratorBuilder, FallbackReason, Lookup,
    NamespaceStats, ReadPath,
};
pub use warmup::{
    Readiness, WarmupOutcome, WarmupReport, WarmupRunner, WarmupSource, WarmupTask, subkey_product,
};

pub use unicache_core::{
    ChangeKind, InvalidationEvent, KeyError, MemoryBus, MemoryStore, StoreError, VersionedKey,
};

/// Build a cache from settings and start its invalidation listener.
///
/// With `redis.enabled`, counters, the shared tier, leases and pub/sub go to
/// Redis. If Redis cannot be reached at startup the cache runs in memory mode
/// instead of failing: single-instance only, but reads keep working.
pub async fn connect(settings: CacheSettings) -> Result<Arc<CacheOrchestrator>, CacheError> {
    settings.validate().map_err(CacheError::Config)?;

    let mut builder = CacheOrchestrator::builder().with_settings(settings.clone());
    if settings.redis.enabled {
        match unicache_redis::connect(&settings.redis).await {
            Ok((store, bus)) => {
                let store = Arc::new(store);
                builder = builder
                    .with_counter_store(store.clone())
                    .with_value_store(store.clone())
                    .with_lock_store(store)
                    .with_bus(Arc::new(bus))
                    .with_mode(CacheMode::Redis);
                tracing::info!(url = %settings.redis.url, "cache connected to redis");
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "redis unavailable, cache falling back to in-memory mode"
                );
            }
        }
    } else {
        tracing::info!("redis disabled, cache running in-memory");
    }

    let cache = builder.build()?;
    cache.start_listener();
    Ok(cache)
}
