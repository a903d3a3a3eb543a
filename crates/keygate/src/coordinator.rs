//! Resource coordinator: global admission plus per-key mutual exclusion.
//!
//! Every operation goes through [`Coordinator::guarded`]: take an admission
//! slot, run the kind-specific step, give the slot back. Slots and per-key
//! locks are RAII guards, so they are released on success, on error, on
//! panic and when the caller drops the future.
//!
//! Per-key discipline:
//! - Acquire waits unguarded, then locks the key only to mark it known.
//! - Verify locks the key, checks it is known, then waits while holding it.
//! - Mutate locks the key, marks it known, then waits while holding it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::CoordinatorConfig;
use crate::delay::{Delay, SleepDelay};
use crate::error::{CoordinatorError, Result};
use crate::events::{CoordinatorEvent, EventSink};
use crate::gate::{AdmissionGate, AdmissionSlot};
use crate::key::ResourceKey;
use crate::region::Region;
use crate::registry::{self, KeyGuard, KeyLock};
use crate::request::{OperationKind, OperationRequest, Outcome};

/// Point-in-time view of coordinator state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorSnapshot {
    pub max_concurrent: usize,
    pub active: usize,
    pub peak_active: usize,
    /// Sorted for stable output.
    pub known_resources: Vec<ResourceKey>,
    pub registered_locks: usize,
}

pub struct Coordinator {
    gate: AdmissionGate,
    region: Region,
    delay: Arc<dyn Delay>,
    events: EventSink,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("gate", &self.gate)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// Holds the admission slot for one operation and reports its release.
struct OperationScope<'a> {
    _slot: AdmissionSlot<'a>,
    events: &'a EventSink,
    request: &'a OperationRequest,
}

impl Drop for OperationScope<'_> {
    fn drop(&mut self) {
        self.events.emit(CoordinatorEvent::SlotReleased {
            op: self.request.id,
            kind: self.request.kind,
            key: self.request.key.clone(),
        });
    }
}

impl Coordinator {
    /// Create a coordinator admitting at most `max_concurrent` operations.
    ///
    /// All synchronization state is built here; nothing waits during
    /// construction.
    pub fn new(max_concurrent: usize) -> Result<Self> {
        if max_concurrent == 0 {
            return Err(CoordinatorError::InvalidLimit { max_concurrent });
        }

        Ok(Self {
            gate: AdmissionGate::new(max_concurrent),
            region: Region::new(),
            delay: Arc::new(SleepDelay::new()),
            events: EventSink::disabled(),
        })
    }

    pub fn from_config(config: &CoordinatorConfig) -> Result<Self> {
        Self::new(config.max_concurrent)
    }

    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.gate.max_concurrent()
    }

    pub fn active_count(&self) -> usize {
        self.region.lock().active
    }

    pub fn is_known(&self, key: &ResourceKey) -> bool {
        self.region.lock().known.contains(key)
    }

    pub fn known_resources(&self) -> Vec<ResourceKey> {
        let mut known: Vec<_> = self.region.lock().known.iter().cloned().collect();
        known.sort();
        known
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        let state = self.region.lock();
        let mut known_resources: Vec<_> = state.known.iter().cloned().collect();
        known_resources.sort();

        CoordinatorSnapshot {
            max_concurrent: self.gate.max_concurrent(),
            active: state.active,
            peak_active: state.peak_active,
            known_resources,
            registered_locks: state.locks.len(),
        }
    }

    /// The lock handle for `key`, created on first reference.
    pub fn key_lock(&self, key: &ResourceKey) -> KeyLock {
        registry::get_or_create(&self.region, key)
    }

    /// Run one operation request to completion.
    pub async fn execute(&self, request: &OperationRequest) -> Result<Outcome> {
        match request.kind {
            OperationKind::Acquire => self.guarded(request, self.acquire_step(request)).await,
            OperationKind::Verify => self.guarded(request, self.verify_step(request)).await,
            OperationKind::Mutate => self.guarded(request, self.mutate_step(request)).await,
        }
    }

    pub async fn acquire(
        &self,
        key: impl Into<ResourceKey>,
        duration: Duration,
    ) -> Result<Outcome> {
        self.execute(&OperationRequest::acquire(key, duration)).await
    }

    pub async fn verify(
        &self,
        key: impl Into<ResourceKey>,
        duration: Duration,
    ) -> Result<Outcome> {
        self.execute(&OperationRequest::verify(key, duration)).await
    }

    pub async fn mutate(
        &self,
        key: impl Into<ResourceKey>,
        duration: Duration,
    ) -> Result<Outcome> {
        self.execute(&OperationRequest::mutate(key, duration)).await
    }

    /// Admission wrapper shared by every operation kind.
    ///
    /// `step` is lazy and only starts running once a slot is held.
    async fn guarded<F>(&self, request: &OperationRequest, step: F) -> Result<Outcome>
    where
        F: Future<Output = Result<Outcome>>,
    {
        let scope = self.admit(request).await;
        let started = Instant::now();

        let result = step.await;
        match &result {
            Ok(Outcome::Completed) => self.events.emit(CoordinatorEvent::Completed {
                op: request.id,
                kind: request.kind,
                key: request.key.clone(),
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Outcome::ResourceNotFound) => {
                self.events.emit(CoordinatorEvent::ResourceNotFound {
                    op: request.id,
                    kind: request.kind,
                    key: request.key.clone(),
                })
            }
            Err(e) => self.events.emit(CoordinatorEvent::Failed {
                op: request.id,
                kind: request.kind,
                key: request.key.clone(),
                error: e.to_string(),
            }),
        }

        drop(scope);
        result
    }

    async fn admit<'a>(&'a self, request: &'a OperationRequest) -> OperationScope<'a> {
        let slot = match self.gate.try_enter(&self.region) {
            Some(slot) => slot,
            None => {
                self.events.emit(CoordinatorEvent::SlotWaiting {
                    op: request.id,
                    kind: request.kind,
                    key: request.key.clone(),
                });
                self.gate.enter(&self.region).await
            }
        };

        self.events.emit(CoordinatorEvent::SlotAcquired {
            op: request.id,
            kind: request.kind,
            key: request.key.clone(),
            active: slot.active_at_entry(),
        });

        OperationScope {
            _slot: slot,
            events: &self.events,
            request,
        }
    }

    async fn acquire_step(&self, request: &OperationRequest) -> Result<Outcome> {
        tracing::info!(
            op = %request.id,
            key = %request.key,
            duration_ms = u64::try_from(request.duration.as_millis()).unwrap_or(u64::MAX),
            "Acquiring resource"
        );

        // The transfer itself needs no exclusivity.
        self.wait(request).await?;

        let lock = self.key_lock(&request.key);
        let _guard = self.lock_key(request, &lock).await;
        self.register(request);

        Ok(Outcome::Completed)
    }

    async fn verify_step(&self, request: &OperationRequest) -> Result<Outcome> {
        tracing::info!(op = %request.id, key = %request.key, "Verifying resource");

        let lock = self.key_lock(&request.key);
        let _guard = self.lock_key(request, &lock).await;

        if !self.is_known(&request.key) {
            return Ok(Outcome::ResourceNotFound);
        }

        self.wait(request).await?;
        Ok(Outcome::Completed)
    }

    async fn mutate_step(&self, request: &OperationRequest) -> Result<Outcome> {
        tracing::info!(op = %request.id, key = %request.key, "Mutating resource");

        let lock = self.key_lock(&request.key);
        let _guard = self.lock_key(request, &lock).await;
        self.register(request);

        self.wait(request).await?;
        Ok(Outcome::Completed)
    }

    async fn lock_key(&self, request: &OperationRequest, lock: &KeyLock) -> KeyGuard {
        if let Some(guard) = lock.try_lock() {
            return guard;
        }

        self.events.emit(CoordinatorEvent::LockWaiting {
            op: request.id,
            kind: request.kind,
            key: request.key.clone(),
        });
        lock.lock().await
    }

    /// Mark the request's key known; idempotent.
    fn register(&self, request: &OperationRequest) {
        let registered = self.region.lock().mark_known(&request.key);
        if registered {
            self.events.emit(CoordinatorEvent::ResourceRegistered {
                op: request.id,
                key: request.key.clone(),
            });
        }
    }

    async fn wait(&self, request: &OperationRequest) -> Result<()> {
        self.delay
            .wait(request)
            .await
            .map_err(|source| CoordinatorError::Delay {
                kind: request.kind,
                key: request.key.clone(),
                source,
            })
    }
}
