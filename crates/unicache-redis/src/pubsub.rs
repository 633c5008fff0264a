//! Redis Pub/Sub for cross-instance cache invalidation.
//!
//! ```text
//! Instance 1: invalidate("menu") → INCR cache:version:menu → 4
//!   ↓
//! Redis Pub/Sub: PUBLISH cache:invalidate {"namespace":"menu","new_version":4,...}
//!   ↓
//! Instance 2: listener receives event → drops L1 entries of "menu"
//! Instance 3: listener receives event → drops L1 entries of "menu"
//! ```

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use futures_util::StreamExt;
use redis::AsyncCommands;
use thiserror::Error;
use unicache_core::{
    INVALIDATION_CHANNEL, InvalidationBus, InvalidationEvent, InvalidationHandler, StoreError,
    Subscription,
};

use crate::store::{map_pool_error, map_redis_error};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Errors that end one subscription attempt. The listener reconnects after each.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis subscribe error: {0}")]
    Subscribe(String),

    #[error("Redis pub/sub stream ended")]
    StreamEnded,
}

/// Invalidation bus over Redis `PUBLISH`/`SUBSCRIBE`.
///
/// Publishing uses the pool; each subscription opens a dedicated connection
/// (pooled connections cannot enter subscriber mode).
#[derive(Clone)]
pub struct RedisInvalidationBus {
    pool: Pool,
    redis_url: String,
}

impl RedisInvalidationBus {
    pub fn new(pool: Pool, redis_url: String) -> Self {
        Self { pool, redis_url }
    }
}

#[async_trait]
impl InvalidationBus for RedisInvalidationBus {
    async fn publish(&self, event: &InvalidationEvent) -> Result<(), StoreError> {
        let payload = event
            .to_json()
            .map_err(|e| StoreError::protocol(format!("failed to encode event: {e}")))?;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.publish::<_, _, ()>(INVALIDATION_CHANNEL, &payload)
            .await
            .map_err(map_redis_error)?;

        tracing::debug!(
            namespace = %event.namespace,
            version = event.new_version,
            kind = event.change.as_str(),
            "published cache invalidation"
        );
        Ok(())
    }

    fn subscribe(&self, handler: InvalidationHandler) -> Subscription {
        let listener = Listener {
            redis_url: self.redis_url.clone(),
            handler,
        };
        Subscription::new(tokio::spawn(listener.run_forever()))
    }
}

struct Listener {
    redis_url: String,
    handler: InvalidationHandler,
}

impl Listener {
    /// Keep a subscription alive, reconnecting with exponential backoff.
    async fn run_forever(self) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if let Err(e) = self.run(&mut backoff).await {
                tracing::error!(
                    error = %e,
                    backoff_secs = backoff.as_secs(),
                    "Cache invalidation listener error, reconnecting..."
                );
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn run(&self, backoff: &mut Duration) -> Result<(), SubscribeError> {
        let client = redis::Client::open(self.redis_url.as_str())
            .map_err(|e| SubscribeError::Connection(e.to_string()))?;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| SubscribeError::Connection(e.to_string()))?;

        pubsub
            .subscribe(INVALIDATION_CHANNEL)
            .await
            .map_err(|e| SubscribeError::Subscribe(e.to_string()))?;

        tracing::info!(channel = INVALIDATION_CHANNEL, "Subscribed to invalidation channel");
        *backoff = INITIAL_BACKOFF;

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload = match msg.get_payload::<String>() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read invalidation payload");
                    continue;
                }
            };

            match InvalidationEvent::from_json(&payload) {
                Ok(event) => {
                    tracing::debug!(
                        namespace = %event.namespace,
                        version = event.new_version,
                        origin = %event.origin_id,
                        "received cache invalidation"
                    );
                    (self.handler)(event);
                }
                Err(e) => {
                    tracing::warn!(error = %e, payload = %payload, "failed to parse invalidation event");
                }
            }
        }

        Err(SubscribeError::StreamEnded)
    }
}
