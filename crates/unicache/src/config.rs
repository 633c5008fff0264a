use std::time::Duration;

use serde::{Deserialize, Serialize};
use unicache_core::MAX_TTL;
use unicache_core::key::validate_component;
use unicache_redis::RedisConfig;

use crate::format::ValueFormat;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheSettings {
    /// Redis connection (shared tier, counters, leases, pub/sub)
    #[serde(default)]
    pub redis: RedisConfig,
    /// Policy applied to namespaces that do not override it
    #[serde(default)]
    pub defaults: NamespaceDefaults,
    /// Declared namespaces
    #[serde(default)]
    pub namespaces: Vec<NamespaceConfig>,
    /// Recomputation lease and retry budget
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Encoding of values stored in the shared tier
    #[serde(default)]
    pub format: ValueFormat,
    #[serde(default)]
    pub warmup: WarmupConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CacheSettings {
    pub fn validate(&self) -> Result<(), String> {
        self.redis.validate()?;

        let max_ttl_secs = MAX_TTL.as_secs();
        if self.defaults.ttl_secs == 0 || self.defaults.ttl_secs > max_ttl_secs {
            return Err(format!("defaults.ttl_secs must be in 1..={max_ttl_secs}"));
        }
        if self.defaults.l1_max_entries == 0 {
            return Err("defaults.l1_max_entries must be > 0".into());
        }

        let mut seen = std::collections::HashSet::new();
        for ns in &self.namespaces {
            validate_component("namespace", &ns.name)
                .map_err(|e| format!("namespaces: {e}"))?;
            if !seen.insert(ns.name.as_str()) {
                return Err(format!("namespaces: `{}` declared twice", ns.name));
            }
            for ttl in [ns.ttl_secs, ns.l1_ttl_secs].into_iter().flatten() {
                if ttl == 0 || ttl > max_ttl_secs {
                    return Err(format!(
                        "namespaces.{}: ttl must be in 1..={max_ttl_secs}",
                        ns.name
                    ));
                }
            }
            if ns.l1_max_entries == Some(0) {
                return Err(format!("namespaces.{}: l1_max_entries must be > 0", ns.name));
            }
        }

        if self.lock.lease_ms == 0 || self.lock.lease() > MAX_TTL {
            return Err(format!("lock.lease_ms must be in 1..={}", MAX_TTL.as_millis()));
        }
        if self.lock.retry_backoff_ms == 0 || self.lock.max_backoff_ms < self.lock.retry_backoff_ms {
            return Err("lock.retry_backoff_ms must be > 0 and <= lock.max_backoff_ms".into());
        }
        // Losers that stop waiting before the lease ends all run the loader.
        let wait = self.lock.wait_budget();
        if wait < self.lock.lease() {
            return Err(format!(
                "lock: retry budget of {}ms is shorter than lease_ms ({}); raise retry_attempts or max_backoff_ms",
                wait.as_millis(),
                self.lock.lease_ms
            ));
        }
        if self.timeouts.operation_ms == 0 {
            return Err("timeouts.operation_ms must be > 0".into());
        }

        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    /// Declare a namespace (mostly for programmatic setup and tests).
    pub fn with_namespace(mut self, namespace: NamespaceConfig) -> Self {
        self.namespaces.push(namespace);
        self
    }
}

/// Defaults for every namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceDefaults {
    /// TTL for both tiers in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// L1 max entries per namespace
    #[serde(default = "default_l1_max_entries")]
    pub l1_max_entries: u64,
}

fn default_ttl_secs() -> u64 {
    1800 // 30 minutes
}

fn default_l1_max_entries() -> u64 {
    1000
}

impl Default for NamespaceDefaults {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            l1_max_entries: default_l1_max_entries(),
        }
    }
}

/// A declared namespace. Unset fields fall back to [`NamespaceDefaults`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub name: String,

    /// Shared tier TTL in seconds (also the L1 TTL unless `l1_ttl_secs` is set)
    #[serde(default)]
    pub ttl_secs: Option<u64>,

    /// L1 TTL override in seconds
    #[serde(default)]
    pub l1_ttl_secs: Option<u64>,

    /// L1 capacity override
    #[serde(default)]
    pub l1_max_entries: Option<u64>,
}

impl NamespaceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ttl_secs: None,
            l1_ttl_secs: None,
            l1_max_entries: None,
        }
    }

    pub fn ttl_secs(mut self, secs: u64) -> Self {
        self.ttl_secs = Some(secs);
        self
    }

    pub fn l1_ttl_secs(mut self, secs: u64) -> Self {
        self.l1_ttl_secs = Some(secs);
        self
    }

    pub fn l1_max_entries(mut self, entries: u64) -> Self {
        self.l1_max_entries = Some(entries);
        self
    }
}

/// Lease and retry settings for cold-entry recomputation.
///
/// A caller that loses the lease waits at most [`LockConfig::wait_budget`]
/// for the holder's result. The budget must cover `lease_ms`, otherwise a
/// slow loader makes every waiter recompute uncached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lease duration in milliseconds
    #[serde(default = "default_lease_ms")]
    pub lease_ms: u64,

    /// How many times a caller that lost the lease re-checks the tiers
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// First backoff between re-checks, doubled each attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Backoff ceiling
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_lease_ms() -> u64 {
    5000
}

fn default_retry_attempts() -> u32 {
    16 // 50 + 100 + 200 + 13 * 400 = 5550ms
}

fn default_retry_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    400
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ms: default_lease_ms(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl LockConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Sum of all backoff sleeps before a lease loser reads uncached.
    pub fn wait_budget(&self) -> Duration {
        let mut total: u64 = 0;
        let mut backoff = self.retry_backoff_ms;
        for attempt in 0..self.retry_attempts {
            if backoff >= self.max_backoff_ms {
                let remaining = u64::from(self.retry_attempts - attempt);
                total = total.saturating_add(self.max_backoff_ms.saturating_mul(remaining));
                break;
            }
            total = total.saturating_add(backoff);
            backoff = backoff.saturating_mul(2).min(self.max_backoff_ms);
        }
        Duration::from_millis(total)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Deadline for every store call (version, shared tier, lease, publish)
    #[serde(default = "default_operation_ms")]
    pub operation_ms: u64,

    /// How long a locally known namespace version is trusted before re-reading
    /// it from the store. 0 reads it on every access.
    #[serde(default = "default_version_refresh_ms")]
    pub version_refresh_ms: u64,
}

fn default_operation_ms() -> u64 {
    250
}

fn default_version_refresh_ms() -> u64 {
    1000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            operation_ms: default_operation_ms(),
            version_refresh_ms: default_version_refresh_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn operation(&self) -> Duration {
        Duration::from_millis(self.operation_ms)
    }

    pub fn version_refresh(&self) -> Duration {
        Duration::from_millis(self.version_refresh_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupConfig {
    #[serde(default = "default_warmup_enabled")]
    pub enabled: bool,

    /// Upper bound on how long the critical subset may delay readiness
    #[serde(default = "default_critical_timeout_secs")]
    pub critical_timeout_secs: u64,
}

fn default_warmup_enabled() -> bool {
    true
}

fn default_critical_timeout_secs() -> u64 {
    30
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: default_warmup_enabled(),
            critical_timeout_secs: default_critical_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::CacheSettings;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default settings file looked up when no path is given.
    pub const DEFAULT_PATH: &str = "unicache.toml";

    pub fn load_settings(path: Option<&str>) -> Result<CacheSettings, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            return Err(format!("config file not found: {}", pathbuf.display()));
        }
        // Environment variable overrides, e.g., UNICACHE__REDIS__ENABLED=true
        builder = builder.add_source(
            Environment::with_prefix("UNICACHE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: CacheSettings = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = CacheSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.defaults.ttl_secs, 1800);
        assert!(!settings.redis.enabled);
    }

    #[test]
    fn test_rejects_separator_in_namespace() {
        let settings = CacheSettings::default().with_namespace(NamespaceConfig::new("bad:name"));
        assert!(settings.validate().unwrap_err().contains("separator"));
    }

    #[test]
    fn test_rejects_duplicate_namespace() {
        let settings = CacheSettings::default()
            .with_namespace(NamespaceConfig::new("i18n"))
            .with_namespace(NamespaceConfig::new("i18n"));
        assert!(settings.validate().unwrap_err().contains("twice"));
    }

    #[test]
    fn test_rejects_bad_backoff() {
        let mut settings = CacheSettings::default();
        settings.lock.max_backoff_ms = 10;
        settings.lock.retry_backoff_ms = 20;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_ttl_beyond_cap() {
        let settings = CacheSettings::default()
            .with_namespace(NamespaceConfig::new("menu").ttl_secs(u64::MAX));
        assert!(settings.validate().unwrap_err().contains("namespaces.menu"));

        let settings = CacheSettings::default()
            .with_namespace(NamespaceConfig::new("menu").l1_ttl_secs(MAX_TTL.as_secs() + 1));
        assert!(settings.validate().is_err());

        let mut settings = CacheSettings::default();
        settings.defaults.ttl_secs = u64::MAX;
        assert!(settings.validate().unwrap_err().contains("defaults.ttl_secs"));

        let mut settings = CacheSettings::default();
        settings.lock.lease_ms = u64::MAX;
        assert!(settings.validate().unwrap_err().contains("lock.lease_ms"));

        let settings = CacheSettings::default()
            .with_namespace(NamespaceConfig::new("menu").ttl_secs(MAX_TTL.as_secs()));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_wait_budget() {
        let lock = LockConfig::default();
        assert_eq!(lock.wait_budget(), Duration::from_millis(5550));
        assert!(lock.wait_budget() >= lock.lease());

        let capped = LockConfig {
            retry_attempts: u32::MAX,
            max_backoff_ms: u64::MAX,
            ..LockConfig::default()
        };
        assert_eq!(capped.wait_budget(), Duration::from_millis(u64::MAX));

        let none = LockConfig {
            retry_attempts: 0,
            ..LockConfig::default()
        };
        assert_eq!(none.wait_budget(), Duration::ZERO);
    }

    #[test]
    fn test_rejects_retry_budget_shorter_than_lease() {
        let mut settings = CacheSettings::default();
        settings.lock.retry_attempts = 10;
        let err = settings.validate().unwrap_err();
        assert!(err.contains("3150ms"), "{err}");

        settings.lock.lease_ms = 3000;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unicache.toml");
        std::fs::write(
            &path,
            r#"
format = "msgpack"

[defaults]
ttl_secs = 600

[[namespaces]]
name = "i18n"

[[namespaces]]
name = "dashboard-stats"
ttl_secs = 120
l1_ttl_secs = 30
l1_max_entries = 50

[lock]
lease_ms = 2000
"#,
        )
        .unwrap();

        let settings = loader::load_settings(path.to_str()).unwrap();
        assert_eq!(settings.format, ValueFormat::Msgpack);
        assert_eq!(settings.defaults.ttl_secs, 600);
        assert_eq!(settings.namespaces.len(), 2);
        assert_eq!(settings.namespaces[1].l1_ttl_secs, Some(30));
        assert_eq!(settings.lock.lease_ms, 2000);
        assert_eq!(settings.lock.retry_attempts, 16);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(loader::load_settings(Some("/nonexistent/unicache.toml")).is_err());
    }
}
