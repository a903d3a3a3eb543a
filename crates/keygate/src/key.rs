//! Identifiers: resource keys and per-operation correlation ids.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque name of a target resource. Equality is exact match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ResourceKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl Borrow<str> for ResourceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for one submitted operation.
///
/// Only used to correlate log lines and events; the coordinator never keys
/// state on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(uuid::Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn resource_key_is_exact_match() {
        assert_eq!(ResourceKey::from("a/b"), ResourceKey::new("a/b".to_string()));
        assert_ne!(ResourceKey::from("a/b"), ResourceKey::from("a/b/"));
        assert_ne!(ResourceKey::from("File"), ResourceKey::from("file"));
    }

    #[test]
    fn resource_key_set_lookup_by_str() {
        let mut set = HashSet::new();
        set.insert(ResourceKey::from("notes.txt"));
        assert!(set.contains("notes.txt"));
        assert!(!set.contains("notes"));
    }

    #[test]
    fn resource_key_serializes_transparent() {
        let key = ResourceKey::from("users/passwords.txt");
        insta::assert_json_snapshot!(key, @r#""users/passwords.txt""#);
    }

    #[test]
    fn operation_ids_are_unique() {
        assert_ne!(OperationId::new(), OperationId::new());
    }
}
