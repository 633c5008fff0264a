use std::time::Duration;

use thiserror::Error;

/// Errors raised by a shared store or message bus.
///
/// All variants belong to the "cache unavailable" class: readers recover
/// from them by computing the value without caching.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation `{operation}` timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("store protocol error: {0}")]
    Protocol(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors raised while composing or parsing a versioned key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("{component} must not be empty")]
    Empty { component: &'static str },

    #[error("{component} `{value}` contains the reserved separator ':'")]
    ReservedSeparator {
        component: &'static str,
        value: String,
    },

    #[error("malformed versioned key `{0}`")]
    Malformed(String),
}
