//! Versioned key codec.
//!
//! Every cached value is addressed as `{namespace}:v{version}:{subkey}`.
//! Invalidating a namespace bumps its version, so readers move to a fresh key
//! space while entries under the old version simply age out through their TTL.
//!
//! ```text
//! i18n:v1:uz-UZ   ──invalidate("i18n")──▶   i18n:v2:uz-UZ
//! (left in L2 until TTL)                    (written on next miss)
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::KeyError;

/// Separator between key components. Reserved: no component may contain it.
pub const KEY_SEPARATOR: char = ':';

/// Joiner used by [`compose_subkey`] for multi-part subkeys.
pub const SUBKEY_JOINER: char = '|';

const VERSION_KEY_PREFIX: &str = "cache:version:";
const LOCK_KEY_PREFIX: &str = "cache:lock:";

/// A fully resolved cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionedKey {
    namespace: String,
    version: u64,
    subkey: String,
}

impl VersionedKey {
    /// Build a key after validating both string components.
    pub fn new(
        namespace: impl Into<String>,
        version: u64,
        subkey: impl Into<String>,
    ) -> Result<Self, KeyError> {
        let namespace = namespace.into();
        let subkey = subkey.into();
        validate_component("namespace", &namespace)?;
        validate_component("subkey", &subkey)?;
        Ok(Self {
            namespace,
            version,
            subkey,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn subkey(&self) -> &str {
        &self.subkey
    }

    /// Render as `{namespace}:v{version}:{subkey}`.
    pub fn encode(&self) -> String {
        format!("{}:v{}:{}", self.namespace, self.version, self.subkey)
    }

    /// Parse a key produced by [`VersionedKey::encode`].
    pub fn decode(raw: &str) -> Result<Self, KeyError> {
        let mut parts = raw.split(KEY_SEPARATOR);
        let (Some(namespace), Some(version), Some(subkey), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(KeyError::Malformed(raw.to_string()));
        };

        let version = version
            .strip_prefix('v')
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| KeyError::Malformed(raw.to_string()))?;

        Self::new(namespace, version, subkey)
    }

    /// Lock key guarding recomputation of this entry.
    pub fn lock_key(&self) -> String {
        format!("{LOCK_KEY_PREFIX}{}", self.encode())
    }
}

impl fmt::Display for VersionedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:v{}:{}", self.namespace, self.version, self.subkey)
    }
}

impl FromStr for VersionedKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Shared-store key holding the version counter of a namespace.
pub fn version_key(namespace: &str) -> String {
    format!("{VERSION_KEY_PREFIX}{namespace}")
}

/// Glob matching every key of `namespace` at `version`, for admin tooling.
pub fn key_pattern(namespace: &str, version: u64) -> String {
    format!("{namespace}:v{version}:*")
}

/// Join the semantic parts of a subkey (e.g. user id and locale).
pub fn compose_subkey<I, S>(parts: I) -> Result<String, KeyError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for (idx, part) in parts.into_iter().enumerate() {
        let part = part.as_ref();
        validate_component("subkey part", part)?;
        if idx > 0 {
            out.push(SUBKEY_JOINER);
        }
        out.push_str(part);
    }
    if out.is_empty() {
        return Err(KeyError::Empty {
            component: "subkey",
        });
    }
    Ok(out)
}

/// Check a namespace name or subkey for emptiness and the reserved separator.
pub fn validate_component(component: &'static str, value: &str) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::Empty { component });
    }
    if value.contains(KEY_SEPARATOR) {
        return Err(KeyError::ReservedSeparator {
            component,
            value: value.to_string(),
        });
    }
    Ok(())
}
