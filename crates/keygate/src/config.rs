//! Coordinator and driver configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::key::ResourceKey;
use crate::request::OperationKind;

/// Environment variable that overrides the default admission limit.
pub const MAX_CONCURRENT_ENV: &str = "KEYGATE_MAX_CONCURRENT";

const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Resources the default driver run picks from, with their simulated
/// durations in seconds.
const DEFAULT_CATALOG: [(&str, u64); 5] = [
    ("google.com/testfile", 8),
    ("www.site.com/secret", 5),
    ("local/file/path/notes.txt", 7),
    ("users/passwords.txt", 10),
    ("pypi.org/testpackage/v1.2", 6),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub max_concurrent: usize,
}

impl CoordinatorConfig {
    pub fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }

    /// Read `KEYGATE_MAX_CONCURRENT`, failing on values that do not parse.
    /// Unset means the default limit.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_value(std::env::var(MAX_CONCURRENT_ENV).ok().as_deref())
    }

    fn from_env_value(raw: Option<&str>) -> Result<Self, ConfigError> {
        match raw {
            Some(raw) => Ok(Self::new(parse_max_concurrent(raw)?)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

fn parse_max_concurrent(raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidEnv {
            name: MAX_CONCURRENT_ENV,
            value: raw.to_string(),
        }),
    }
}

/// Convert user-supplied seconds into a `Duration`.
pub fn duration_from_secs(field: &str, seconds: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(seconds).map_err(|_| ConfigError::InvalidDuration {
        field: field.to_string(),
        seconds,
    })
}

/// One resource the driver may target, with its simulated duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub key: ResourceKey,
    pub duration: Duration,
}

impl CatalogEntry {
    pub fn new(key: impl Into<ResourceKey>, duration: Duration) -> Self {
        Self {
            key: key.into(),
            duration,
        }
    }

    pub fn from_secs(key: impl Into<ResourceKey>, seconds: f64) -> Result<Self, ConfigError> {
        let key = key.into();
        let duration = duration_from_secs(key.as_str(), seconds)?;
        Ok(Self { key, duration })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Number of operations to submit.
    pub operations: usize,
    /// Upper bound of the random pause between submissions.
    pub max_think_time: Duration,
    /// Multiplier applied to think time. Operation durations are scaled by
    /// the coordinator's delay, not here.
    pub time_scale: f64,
    pub catalog: Vec<CatalogEntry>,
    /// Operation kinds to draw from.
    pub kinds: Vec<OperationKind>,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl DriverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        if self.kinds.is_empty() {
            return Err(ConfigError::NoKinds);
        }
        if !self.time_scale.is_finite() || self.time_scale < 0.0 {
            return Err(ConfigError::InvalidTimeScale(self.time_scale));
        }
        Ok(())
    }

    pub fn with_operations(mut self, operations: usize) -> Self {
        self.operations = operations;
        self
    }

    pub fn with_max_think_time(mut self, max_think_time: Duration) -> Self {
        self.max_think_time = max_think_time;
        self
    }

    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }

    pub fn with_catalog(mut self, catalog: Vec<CatalogEntry>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<OperationKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            operations: 10,
            max_think_time: Duration::from_secs(3),
            time_scale: 1.0,
            catalog: DEFAULT_CATALOG
                .iter()
                .map(|(key, secs)| CatalogEntry::new(*key, Duration::from_secs(*secs)))
                .collect(),
            kinds: OperationKind::ALL.to_vec(),
            seed: None,
        }
    }
}
