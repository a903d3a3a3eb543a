//! keygate: bounded-concurrency admission with per-resource mutual exclusion.
//!
//! A [`Coordinator`] admits at most `max_concurrent` operations at a time and
//! additionally serializes Verify/Mutate operations that target the same
//! [`ResourceKey`]. Operations on different keys never contend beyond the
//! global limit.

mod region;

pub mod config;
pub mod coordinator;
pub mod delay;
pub mod driver;
pub mod error;
pub mod events;
pub mod gate;
pub mod key;
pub mod registry;
pub mod request;

pub use config::{CatalogEntry, CoordinatorConfig, DriverConfig};
pub use coordinator::{Coordinator, CoordinatorSnapshot};
pub use delay::{Delay, SleepDelay};
pub use driver::{Driver, RunReport, Submission};
pub use error::{ConfigError, CoordinatorError, DelayError};
pub use events::{CoordinatorEvent, EventSink, drain_events};
pub use gate::{AdmissionGate, AdmissionSlot};
pub use key::{OperationId, ResourceKey};
pub use registry::{KeyGuard, KeyLock};
pub use request::{OperationKind, OperationRequest, Outcome};
