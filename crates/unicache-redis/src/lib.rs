//! Redis implementation of the unicache store protocol.
//!
//! | Primitive          | Redis command                 |
//! |--------------------|-------------------------------|
//! | counter get-or-init| `MULTI; SETNX; GET; EXEC`     |
//! | counter increment  | `INCRBY`                      |
//! | value get/set/del  | `GET` / `PSETEX` / `DEL`      |
//! | lease acquire      | `SET key token NX PX ms`      |
//! | lease release      | `DEL`                         |
//! | invalidation bus   | `PUBLISH` / `SUBSCRIBE`       |

pub mod config;
pub mod pubsub;
pub mod store;

use deadpool_redis::Pool;
use unicache_core::StoreError;

pub use config::RedisConfig;
pub use pubsub::RedisInvalidationBus;
pub use store::RedisStore;

/// Build a connection pool from configuration without connecting.
pub fn create_pool(config: &RedisConfig) -> Result<Pool, StoreError> {
    let timeout = config.timeout();

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let pool_config = redis_config
        .pool
        .get_or_insert_with(|| deadpool_redis::PoolConfig::new(config.pool_size));
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);

    redis_config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| StoreError::unavailable(format!("failed to create Redis pool: {e}")))
}

/// Connect to Redis and verify the connection with `PING`.
///
/// Returns the store and the bus sharing one pool.
pub async fn connect(config: &RedisConfig) -> Result<(RedisStore, RedisInvalidationBus), StoreError> {
    tracing::info!(url = %config.url, "Connecting to Redis");

    let pool = create_pool(config)?;
    let store = RedisStore::new(pool.clone());
    store.ping().await?;

    tracing::info!("Connected to Redis");
    Ok((store, RedisInvalidationBus::new(pool, config.url.clone())))
}
