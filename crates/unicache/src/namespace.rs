//! Namespace registry: TTL and capacity policy per cache family.

use std::collections::HashMap;
use std::time::Duration;

use dashmap::DashSet;

use crate::config::{CacheSettings, NamespaceDefaults};
use crate::error::CacheError;

/// Resolved policy of one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePolicy {
    pub name: String,
    pub l1_ttl: Duration,
    pub l2_ttl: Duration,
    pub l1_max_entries: u64,
}

impl NamespacePolicy {
    fn from_defaults(name: &str, defaults: &NamespaceDefaults) -> Self {
        let ttl = Duration::from_secs(defaults.ttl_secs);
        Self {
            name: name.to_string(),
            l1_ttl: ttl,
            l2_ttl: ttl,
            l1_max_entries: defaults.l1_max_entries,
        }
    }
}

/// Namespaces declared at configuration time.
///
/// Lookups for undeclared namespaces get the default policy; a warning is
/// logged the first time each such name is seen.
#[derive(Debug)]
pub struct NamespaceRegistry {
    declared: HashMap<String, NamespacePolicy>,
    defaults: NamespaceDefaults,
    warned: DashSet<String>,
}

impl NamespaceRegistry {
    pub fn from_settings(settings: &CacheSettings) -> Result<Self, CacheError> {
        settings.validate().map_err(CacheError::Config)?;

        let declared = settings
            .namespaces
            .iter()
            .map(|ns| {
                let l2_ttl = Duration::from_secs(ns.ttl_secs.unwrap_or(settings.defaults.ttl_secs));
                let l1_ttl = ns.l1_ttl_secs.map(Duration::from_secs).unwrap_or(l2_ttl);
                let policy = NamespacePolicy {
                    name: ns.name.clone(),
                    l1_ttl,
                    l2_ttl,
                    l1_max_entries: ns
                        .l1_max_entries
                        .unwrap_or(settings.defaults.l1_max_entries),
                };
                (ns.name.clone(), policy)
            })
            .collect();

        Ok(Self {
            declared,
            defaults: settings.defaults.clone(),
            warned: DashSet::new(),
        })
    }

    pub fn policy(&self, namespace: &str) -> NamespacePolicy {
        if let Some(policy) = self.declared.get(namespace) {
            return policy.clone();
        }
        if self.warned.insert(namespace.to_string()) {
            tracing::warn!(namespace = %namespace, "undeclared cache namespace, using default policy");
        }
        NamespacePolicy::from_defaults(namespace, &self.defaults)
    }

    pub fn is_declared(&self, namespace: &str) -> bool {
        self.declared.contains_key(namespace)
    }

    /// Declared namespace names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.declared.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NamespaceConfig;

    fn registry() -> NamespaceRegistry {
        let settings = CacheSettings::default()
            .with_namespace(NamespaceConfig::new("menu"))
            .with_namespace(
                NamespaceConfig::new("dashboard-stats")
                    .ttl_secs(120)
                    .l1_ttl_secs(15)
                    .l1_max_entries(8),
            )
            .with_namespace(NamespaceConfig::new("i18n").ttl_secs(3600));
        NamespaceRegistry::from_settings(&settings).unwrap()
    }

    #[test]
    fn test_tiers_share_ttl_by_default() {
        let policy = registry().policy("i18n");
        assert_eq!(policy.l1_ttl, Duration::from_secs(3600));
        assert_eq!(policy.l2_ttl, Duration::from_secs(3600));
        assert_eq!(policy.l1_max_entries, 1000);
    }

    #[test]
    fn test_independent_overrides() {
        let policy = registry().policy("dashboard-stats");
        assert_eq!(policy.l1_ttl, Duration::from_secs(15));
        assert_eq!(policy.l2_ttl, Duration::from_secs(120));
        assert_eq!(policy.l1_max_entries, 8);
    }

    #[test]
    fn test_undeclared_uses_defaults() {
        let registry = registry();
        assert!(!registry.is_declared("tenants"));
        let policy = registry.policy("tenants");
        assert_eq!(policy.l2_ttl, Duration::from_secs(1800));
        assert_eq!(policy.name, "tenants");
    }

    #[test]
    fn test_names_sorted() {
        assert_eq!(registry().names(), vec!["dashboard-stats", "i18n", "menu"]);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = CacheSettings::default().with_namespace(NamespaceConfig::new(""));
        assert!(matches!(
            NamespaceRegistry::from_settings(&settings),
            Err(CacheError::Config(_))
        ));
    }
}
