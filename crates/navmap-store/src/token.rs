use std::fmt;

use navmap_types::Map;
use serde::{Deserialize, Serialize};

/// Opaque optimistic-concurrency token of a stored map.
///
/// Callers only compare tokens for equality; each backend chooses its own
/// encoding (a generation counter, a content hash, ...).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcurrencyToken(String);

impl ConcurrencyToken {
    /// The token of a map that has never been written.
    pub fn absent() -> Self {
        Self(String::new())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns `true` if this token denotes a never-written map.
    pub fn is_absent(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_absent() {
            write!(f, "ConcurrencyToken(absent)")
        } else {
            write!(f, "ConcurrencyToken({})", self.0)
        }
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_absent() { "absent" } else { &self.0 })
    }
}

/// A map together with the token it was read at.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionedMap {
    pub map: Map,
    pub token: ConcurrencyToken,
}
