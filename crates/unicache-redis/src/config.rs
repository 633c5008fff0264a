use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the shared tier lives when more than one instance runs.
///
/// Missing fields take their value from [`RedisConfig::default`]. Leaving
/// `enabled` off keeps every primitive in process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub enabled: bool,
    /// `redis://` or `rediss://` connection string
    pub url: String,
    /// Upper bound on pooled connections
    pub pool_size: usize,
    /// Applies to waiting for, opening and recycling a pooled connection
    pub timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "redis://localhost:6379".to_owned(),
            pool_size: 10,
            timeout_ms: 500,
        }
    }
}

impl RedisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Checks only apply while Redis is enabled.
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        let scheme_ok = ["redis://", "rediss://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme));
        if !scheme_ok {
            return Err(format!("redis.url `{}` is not a redis:// or rediss:// URL", self.url));
        }
        match (self.pool_size, self.timeout_ms) {
            (0, _) => Err("redis.pool_size must be at least 1".into()),
            (_, 0) => Err("redis.timeout_ms must be at least 1".into()),
            _ => Ok(()),
        }
    }
}
