//! Admission gate: caps the number of concurrently active operations.
//!
//! The counter lives in the coordinator region; the gate adds the limit and
//! the wake-up signal. An [`AdmissionSlot`] is the only way to hold an
//! admission, and dropping it is the only way to give one back, so every
//! exit path (success, error, panic, dropped future) releases exactly once.

use tokio::sync::Notify;

use crate::region::Region;

#[derive(Debug)]
pub struct AdmissionGate {
    max_concurrent: usize,
    freed: Notify,
}

impl AdmissionGate {
    /// Build a gate. The limit must be non-zero; the coordinator validates it.
    pub(crate) fn new(max_concurrent: usize) -> Self {
        debug_assert!(max_concurrent > 0);
        Self {
            max_concurrent,
            freed: Notify::new(),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Wait until `active < max_concurrent`, then take a slot.
    ///
    /// No ordering among waiters is promised and there is no timeout.
    pub(crate) async fn enter<'a>(&'a self, region: &'a Region) -> AdmissionSlot<'a> {
        let mut announced = false;
        loop {
            // Register interest before checking so a release between the
            // check and the await still wakes us.
            let notified = self.freed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = region.lock();
                if state.active < self.max_concurrent {
                    let active = state.admit();
                    tracing::debug!(active, max = self.max_concurrent, "Admission slot acquired");
                    return AdmissionSlot {
                        gate: self,
                        region,
                        active,
                    };
                }
                if !announced {
                    tracing::debug!(
                        active = state.active,
                        max = self.max_concurrent,
                        "At capacity, waiting for a free slot"
                    );
                    announced = true;
                }
            }

            // Woken spuriously or beaten to the slot: re-check.
            notified.await;
        }
    }

    /// Take a slot only if one is free right now.
    pub(crate) fn try_enter<'a>(&'a self, region: &'a Region) -> Option<AdmissionSlot<'a>> {
        let mut state = region.lock();
        if state.active >= self.max_concurrent {
            return None;
        }
        let active = state.admit();
        Some(AdmissionSlot {
            gate: self,
            region,
            active,
        })
    }

    fn exit(&self, region: &Region) {
        let mut state = region.lock();
        let active = state.release();
        self.freed.notify_one();
        tracing::debug!(active, max = self.max_concurrent, "Admission slot released");
    }
}

/// One admitted operation. Returns its slot to the gate on drop.
#[must_use = "the slot is released as soon as it is dropped"]
#[derive(Debug)]
pub struct AdmissionSlot<'a> {
    gate: &'a AdmissionGate,
    region: &'a Region,
    active: usize,
}

impl AdmissionSlot<'_> {
    /// Active count observed right after this slot was admitted.
    pub fn active_at_entry(&self) -> usize {
        self.active
    }
}

impl Drop for AdmissionSlot<'_> {
    fn drop(&mut self) {
        self.gate.exit(self.region);
    }
}
