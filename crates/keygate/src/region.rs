//! The coordinator's exclusive region.
//!
//! One `std::sync::Mutex` guards the active-operation counter, the set of
//! known resources and mutation of the lock registry. It is only ever held
//! for short bookkeeping steps and never across an `.await`; per-key critical
//! sections run under their own locks.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::key::ResourceKey;
use crate::registry::LockRegistry;

#[derive(Debug, Default)]
pub(crate) struct RegionState {
    pub active: usize,
    pub peak_active: usize,
    pub known: HashSet<ResourceKey>,
    pub locks: LockRegistry,
}

impl RegionState {
    /// Record an admission. Caller has already checked the limit.
    pub fn admit(&mut self) -> usize {
        self.active += 1;
        self.peak_active = self.peak_active.max(self.active);
        self.active
    }

    pub fn release(&mut self) -> usize {
        debug_assert!(self.active > 0, "release without matching admit");
        self.active = self.active.saturating_sub(1);
        self.active
    }

    /// Mark `key` known. Returns `true` on the Unknown -> Known transition.
    pub fn mark_known(&mut self, key: &ResourceKey) -> bool {
        if self.known.contains(key) {
            return false;
        }
        self.known.insert(key.clone())
    }
}

#[derive(Debug, Default)]
pub(crate) struct Region {
    state: Mutex<RegionState>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the region.
    ///
    /// A poisoned mutex is recovered: every mutation under the region is a
    /// single step, so a panic elsewhere cannot leave it half-updated.
    pub fn lock(&self) -> MutexGuard<'_, RegionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Coordinator region mutex poisoned - recovering state");
                poisoned.into_inner()
            }
        }
    }
}
