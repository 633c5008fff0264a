//! Counters, values and leases on a pooled Redis connection.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, PoolError};
use redis::{AsyncCommands, RedisError};
use unicache_core::{CounterStore, KeyValueStore, LockStore, MAX_TTL, StoreError};

/// Shared store backed by Redis.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Round-trip a `PING` (for health checks).
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn conn(&self) -> Result<Connection, StoreError> {
        self.pool.get().await.map_err(map_pool_error)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get_or_init(&self, key: &str, initial: u64) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        let (value,): (u64,) = redis::pipe()
            .atomic()
            .set_nx(key, initial)
            .ignore()
            .get(key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(value)
    }

    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        self.increment_by(key, 1).await
    }

    async fn increment_by(&self, key: &str, delta: u64) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        conn.incr::<_, _, u64>(key, delta)
            .await
            .map_err(map_redis_error)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(map_redis_error)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl))
            .await
            .map_err(map_redis_error)?;
        tracing::debug!(key = %key, ttl_ms = ttl_millis(ttl), "Redis value set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(key).await.map_err(map_redis_error)?;
        Ok(removed > 0)
    }
}

#[async_trait]
impl LockStore for RedisStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(reply.is_some())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await.map_err(map_redis_error)
    }
}

/// Expiry in milliseconds within `[1, MAX_TTL]`: Redis rejects zero and
/// out-of-range expirations.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.min(MAX_TTL).as_millis())
        .unwrap_or(u64::MAX)
        .max(1)
}

pub(crate) fn map_pool_error(e: PoolError) -> StoreError {
    match e {
        PoolError::Timeout(kind) => StoreError::unavailable(format!("Redis pool timeout ({kind:?})")),
        other => StoreError::unavailable(format!("failed to get Redis connection: {other}")),
    }
}

pub(crate) fn map_redis_error(e: RedisError) -> StoreError {
    if e.is_timeout() || e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        StoreError::unavailable(e.to_string())
    } else {
        StoreError::protocol(e.to_string())
    }
}
