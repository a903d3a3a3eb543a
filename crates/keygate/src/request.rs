//! Operation requests and their outcomes.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::key::{OperationId, ResourceKey};

/// The three guarded operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Unguarded wait, then a short per-key critical section that marks the key known.
    Acquire,
    /// Requires a known key; holds the per-key lock for the whole duration.
    Verify,
    /// Marks the key known if needed; holds the per-key lock for the whole duration.
    Mutate,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [Self::Acquire, Self::Verify, Self::Mutate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Verify => "verify",
            Self::Mutate => "mutate",
        }
    }

    /// Whether the per-key lock is held for the operation's entire duration.
    pub fn serializes_per_key(&self) -> bool {
        matches!(self, Self::Verify | Self::Mutate)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable request to run one guarded operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub id: OperationId,
    pub kind: OperationKind,
    pub key: ResourceKey,
    pub duration: Duration,
}

impl OperationRequest {
    pub fn new(kind: OperationKind, key: impl Into<ResourceKey>, duration: Duration) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            key: key.into(),
            duration,
        }
    }

    pub fn acquire(key: impl Into<ResourceKey>, duration: Duration) -> Self {
        Self::new(OperationKind::Acquire, key, duration)
    }

    pub fn verify(key: impl Into<ResourceKey>, duration: Duration) -> Self {
        Self::new(OperationKind::Verify, key, duration)
    }

    pub fn mutate(key: impl Into<ResourceKey>, duration: Duration) -> Self {
        Self::new(OperationKind::Mutate, key, duration)
    }
}

/// Normal completion of a guarded operation.
///
/// `ResourceNotFound` is a reported outcome, not an error: the operation ran
/// through admission, changed nothing, and released its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    ResourceNotFound,
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_lowercase() {
        insta::assert_json_snapshot!(OperationKind::ALL, @r#"
        [
          "acquire",
          "verify",
          "mutate"
        ]
        "#);
    }

    #[test]
    fn outcome_serializes_snake_case() {
        insta::assert_json_snapshot!(
            [Outcome::Completed, Outcome::ResourceNotFound],
            @r#"
        [
          "completed",
          "resource_not_found"
        ]
        "#
        );
    }

    #[test]
    fn only_verify_and_mutate_serialize_per_key() {
        assert!(!OperationKind::Acquire.serializes_per_key());
        assert!(OperationKind::Verify.serializes_per_key());
        assert!(OperationKind::Mutate.serializes_per_key());
    }

    #[test]
    fn constructors_set_kind_and_fresh_id() {
        let a = OperationRequest::mutate("f", Duration::from_secs(2));
        let b = OperationRequest::mutate("f", Duration::from_secs(2));
        assert_eq!(a.kind, OperationKind::Mutate);
        assert_eq!(a.key, ResourceKey::from("f"));
        assert_ne!(a.id, b.id);
    }
}
