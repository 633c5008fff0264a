use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use unicache_core::{KeyError, StoreError};

/// Errors surfaced by cache administration (invalidation, setup).
///
/// Reads never return this type: they degrade to the loader instead.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid cache key: {0}")]
    Key(#[from] KeyError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Run a store call under a deadline, mapping expiry to [`StoreError::Timeout`].
pub(crate) async fn bounded<T, F>(operation: &'static str, after: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout { operation, after }),
    }
}
