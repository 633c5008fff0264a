//! Value encoding for cached entries.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Wire format of cached values.
///
/// Both tiers store the same bytes, so an L2 hit can be backfilled into L1
/// without re-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    #[default]
    Json,
    /// MessagePack with named fields
    Msgpack,
}

impl ValueFormat {
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        match self {
            Self::Json => serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string())),
            Self::Msgpack => {
                rmp_serde::to_vec_named(value).map_err(|e| CacheError::Serialization(e.to_string()))
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError> {
        match self {
            Self::Json => serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string())),
            Self::Msgpack => {
                rmp_serde::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
            }
        }
    }
}
