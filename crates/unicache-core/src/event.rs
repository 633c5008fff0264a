//! Invalidation events exchanged between instances.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Pub/sub channel carrying [`InvalidationEvent`] payloads.
pub const INVALIDATION_CHANNEL: &str = "cache:invalidate";

/// What an invalidation event covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// One subkey at the current version was dropped.
    SingleKey { subkey: String },
    /// The namespace version advanced; every entry is superseded.
    AllInNamespace,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleKey { .. } => "single_key",
            Self::AllInNamespace => "all_in_namespace",
        }
    }
}

/// Event broadcast when a namespace (or one of its keys) is invalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub namespace: String,
    #[serde(flatten)]
    pub change: ChangeKind,
    /// Namespace version after the change.
    pub new_version: u64,
    /// Instance that published the event.
    pub origin_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl InvalidationEvent {
    /// Event for a whole-namespace version bump.
    pub fn namespace_bumped(namespace: impl Into<String>, new_version: u64) -> Self {
        Self::new(namespace, ChangeKind::AllInNamespace, new_version)
    }

    /// Event for a single dropped subkey.
    pub fn key_dropped(namespace: impl Into<String>, subkey: impl Into<String>, version: u64) -> Self {
        Self::new(
            namespace,
            ChangeKind::SingleKey {
                subkey: subkey.into(),
            },
            version,
        )
    }

    fn new(namespace: impl Into<String>, change: ChangeKind, new_version: u64) -> Self {
        Self {
            namespace: namespace.into(),
            change,
            new_version,
            origin_id: origin_id().to_string(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Override the origin (used when several logical instances share a process).
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin_id = origin.into();
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Identifier of this process: `{hostname}-{uuid}`, fixed for the process lifetime.
pub fn origin_id() -> &'static str {
    static ORIGIN: OnceLock<String> = OnceLock::new();
    ORIGIN.get_or_init(|| {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        format!("{host}-{}", uuid::Uuid::new_v4().simple())
    })
}
