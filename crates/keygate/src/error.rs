use thiserror::Error;

use crate::key::ResourceKey;
use crate::request::OperationKind;

/// Failure reported by a [`Delay`](crate::delay::Delay) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelayError {
    #[error("delay interrupted: {0}")]
    Interrupted(String),
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("max_concurrent must be at least 1, got {max_concurrent}")]
    InvalidLimit { max_concurrent: usize },

    /// The domain step failed. The admission slot and any per-key lock were
    /// released before this was returned.
    #[error("{kind} on '{key}' failed: {source}")]
    Delay {
        kind: OperationKind,
        key: ResourceKey,
        #[source]
        source: DelayError,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}'")]
    InvalidEnv { name: &'static str, value: String },

    #[error("max_concurrent must be at least 1")]
    ZeroConcurrency,

    #[error("invalid duration for {field}: {seconds} seconds")]
    InvalidDuration { field: String, seconds: f64 },

    #[error("invalid time scale {0}: must be finite and non-negative")]
    InvalidTimeScale(f64),

    #[error("driver catalog is empty")]
    EmptyCatalog,

    #[error("driver has no operation kinds to choose from")]
    NoKinds,
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
