use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Defines a validated string identifier newtype.
///
/// The generated type serializes as a plain string so it can be used as a
/// JSON object key, and rejects invalid values on deserialization.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $validate:path) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create an identifier, validating its textual form.
            pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
                let value = value.into();
                $validate($kind, &value)?;
                Ok(Self(value))
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = TypeError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id!(
    /// Identifier of a project. Exactly one live map exists per project.
    ///
    /// Project ids double as file names in the file-backed store, so they are
    /// restricted to ASCII alphanumerics, `-`, `_` and `.` (no leading dot).
    ProjectId,
    "project id",
    validate_path_safe
);

string_id!(
    /// Stable identity of a page node, unique within a map.
    NodeId,
    "node id",
    validate_opaque
);

string_id!(
    /// Stable identity of a route edge, unique within a map.
    EdgeId,
    "edge id",
    validate_opaque
);

fn invalid(kind: &'static str, value: &str, reason: &str) -> TypeError {
    TypeError::InvalidId {
        kind,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_opaque(kind: &'static str, value: &str) -> Result<(), TypeError> {
    if value.trim().is_empty() {
        return Err(invalid(kind, value, "must not be empty"));
    }
    if value.chars().any(char::is_control) {
        return Err(invalid(kind, value, "must not contain control characters"));
    }
    Ok(())
}

fn validate_path_safe(kind: &'static str, value: &str) -> Result<(), TypeError> {
    if value.is_empty() {
        return Err(invalid(kind, value, "must not be empty"));
    }
    if value.len() > 128 {
        return Err(invalid(kind, value, "must be at most 128 bytes"));
    }
    if value.starts_with('.') {
        return Err(invalid(kind, value, "must not start with '.'"));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(kind, value, &format!("invalid character {c:?}")));
    }
    Ok(())
}

/// Identifier of a diff.
///
/// Fresh diffs get a time-ordered UUID v7. Remainder diffs get a
/// deterministic UUID v8 derived from their parent, so at most one remainder
/// can ever be created for a given diff.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffId(uuid::Uuid);

impl DiffId {
    /// Generate a new time-ordered diff ID (UUID v7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The id of the remainder diff created when `parent` is merged.
    pub fn remainder_of(parent: &DiffId) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"navmap.remainder.v1:");
        hasher.update(parent.0.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash.as_bytes()[..16]);
        Self(uuid::Builder::from_custom_bytes(bytes).into_uuid())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for DiffId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DiffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiffId({})", self.short_id())
    }
}

impl fmt::Display for DiffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DiffId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| invalid("diff id", s, &e.to_string()))
    }
}

/// Identity of one mergeable item within a diff: `page:<node_id>` or
/// `route:<edge_id>`.
///
/// Ordering puts all pages before all routes, then orders by id.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ItemKey {
    Page(NodeId),
    Route(EdgeId),
}

impl ItemKey {
    /// `"page"` or `"route"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Page(_) => "page",
            Self::Route(_) => "route",
        }
    }

    /// The bare id without the kind prefix.
    pub fn id(&self) -> &str {
        match self {
            Self::Page(id) => id.as_str(),
            Self::Route(id) => id.as_str(),
        }
    }

    pub fn is_page(&self) -> bool {
        matches!(self, Self::Page(_))
    }

    pub fn is_route(&self) -> bool {
        matches!(self, Self::Route(_))
    }
}

impl fmt::Debug for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemKey({self})")
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

impl FromStr for ItemKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| TypeError::InvalidItemKey(s.to_string()))?;
        let parsed = match kind {
            "page" => NodeId::new(id).map(Self::Page),
            "route" => EdgeId::new(id).map(Self::Route),
            _ => return Err(TypeError::InvalidItemKey(s.to_string())),
        };
        parsed.map_err(|_| TypeError::InvalidItemKey(s.to_string()))
    }
}

impl TryFrom<String> for ItemKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ItemKey> for String {
    fn from(key: ItemKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_rejects_path_traversal() {
        assert!(ProjectId::new("shop-web_2.0").is_ok());
        assert!(ProjectId::new("").is_err());
        assert!(ProjectId::new("../etc").is_err());
        assert!(ProjectId::new(".hidden").is_err());
        assert!(ProjectId::new("a/b").is_err());
    }

    #[test]
    fn node_ids_are_opaque_but_not_blank() {
        assert!(NodeId::new("checkout:/cart/{id}").is_ok());
        assert!(NodeId::new("   ").is_err());
        assert!(EdgeId::new("e\n1").is_err());
    }

    #[test]
    fn item_key_parses_both_kinds() {
        let page: ItemKey = "page:P1".parse().unwrap();
        assert_eq!(page, ItemKey::Page(NodeId::new("P1").unwrap()));
        assert_eq!(page.to_string(), "page:P1");

        let route: ItemKey = "route:R1:alt".parse().unwrap();
        assert_eq!(route.id(), "R1:alt");
        assert!(route.is_route());
    }

    #[test]
    fn item_key_rejects_unknown_kind() {
        assert!("node:P1".parse::<ItemKey>().is_err());
        assert!("P1".parse::<ItemKey>().is_err());
        assert!("page:".parse::<ItemKey>().is_err());
    }

    #[test]
    fn item_key_works_as_json_object_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(ItemKey::Route(EdgeId::new("R1").unwrap()), 1);
        map.insert(ItemKey::Page(NodeId::new("P1").unwrap()), 2);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"page:P1":2,"route:R1":1}"#);
        let back: std::collections::BTreeMap<ItemKey, i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn invalid_ids_fail_deserialization() {
        assert!(serde_json::from_str::<ProjectId>(r#""bad/id""#).is_err());
        assert!(serde_json::from_str::<ItemKey>(r#""tag:x""#).is_err());
    }

    #[test]
    fn remainder_id_is_deterministic_and_distinct() {
        let parent = DiffId::new();
        let a = DiffId::remainder_of(&parent);
        let b = DiffId::remainder_of(&parent);
        assert_eq!(a, b);
        assert_ne!(a, parent);
        assert_ne!(DiffId::remainder_of(&a), a);
    }

    #[test]
    fn diff_id_display_parses_back() {
        let id = DiffId::new();
        let parsed: DiffId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<DiffId>().is_err());
    }
}
