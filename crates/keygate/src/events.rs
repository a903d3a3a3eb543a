//! Lifecycle notices emitted by the coordinator.
//!
//! Every notice is logged through `tracing` and, when a sink is attached,
//! pushed onto an unbounded channel. Delivery is best-effort: a closed
//! receiver is ignored and nothing is ever read back.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::key::{OperationId, ResourceKey};
use crate::request::OperationKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    /// The operation found the gate full and is waiting.
    SlotWaiting {
        op: OperationId,
        kind: OperationKind,
        key: ResourceKey,
    },
    SlotAcquired {
        op: OperationId,
        kind: OperationKind,
        key: ResourceKey,
        active: usize,
    },
    SlotReleased {
        op: OperationId,
        kind: OperationKind,
        key: ResourceKey,
    },
    /// The operation is about to wait on the per-key lock.
    LockWaiting {
        op: OperationId,
        kind: OperationKind,
        key: ResourceKey,
    },
    /// First Unknown -> Known transition for a key.
    ResourceRegistered {
        op: OperationId,
        key: ResourceKey,
    },
    Completed {
        op: OperationId,
        kind: OperationKind,
        key: ResourceKey,
        elapsed_ms: u64,
    },
    ResourceNotFound {
        op: OperationId,
        kind: OperationKind,
        key: ResourceKey,
    },
    Failed {
        op: OperationId,
        kind: OperationKind,
        key: ResourceKey,
        error: String,
    },
}

impl CoordinatorEvent {
    pub fn op(&self) -> OperationId {
        match self {
            Self::SlotWaiting { op, .. }
            | Self::SlotAcquired { op, .. }
            | Self::SlotReleased { op, .. }
            | Self::LockWaiting { op, .. }
            | Self::ResourceRegistered { op, .. }
            | Self::Completed { op, .. }
            | Self::ResourceNotFound { op, .. }
            | Self::Failed { op, .. } => *op,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        match self {
            Self::SlotWaiting { key, .. }
            | Self::SlotAcquired { key, .. }
            | Self::SlotReleased { key, .. }
            | Self::LockWaiting { key, .. }
            | Self::ResourceRegistered { key, .. }
            | Self::Completed { key, .. }
            | Self::ResourceNotFound { key, .. }
            | Self::Failed { key, .. } => key,
        }
    }

    fn log(&self) {
        match self {
            Self::SlotWaiting { op, kind, key } => {
                tracing::warn!(
                    op = %op,
                    kind = %kind,
                    key = %key,
                    "At capacity, waiting for a free worker"
                );
            }
            Self::SlotAcquired {
                op,
                kind,
                key,
                active,
            } => {
                tracing::debug!(op = %op, kind = %kind, key = %key, active, "Slot acquired");
            }
            Self::SlotReleased { op, kind, key } => {
                tracing::debug!(op = %op, kind = %kind, key = %key, "Slot released");
            }
            Self::LockWaiting { op, kind, key } => {
                tracing::debug!(op = %op, kind = %kind, key = %key, "Waiting for resource lock");
            }
            Self::ResourceRegistered { op, key } => {
                tracing::info!(op = %op, key = %key, "Resource registered");
            }
            Self::Completed {
                op,
                kind,
                key,
                elapsed_ms,
            } => {
                tracing::info!(
                    op = %op,
                    kind = %kind,
                    key = %key,
                    elapsed_ms,
                    "Operation completed"
                );
            }
            Self::ResourceNotFound { op, kind, key } => {
                tracing::warn!(op = %op, kind = %kind, key = %key, "Resource not found");
            }
            Self::Failed {
                op,
                kind,
                key,
                error,
            } => {
                tracing::error!(
                    op = %op,
                    kind = %kind,
                    key = %key,
                    error = %error,
                    "Operation failed"
                );
            }
        }
    }
}

/// Optional, best-effort destination for [`CoordinatorEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<CoordinatorEvent>>,
}

impl EventSink {
    /// A sink that only logs.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(tx: mpsc::UnboundedSender<CoordinatorEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Create a sink and the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CoordinatorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: CoordinatorEvent) {
        event.log();
        if let Some(tx) = &self.tx
            && !tx.is_closed()
        {
            let _ = tx.send(event);
        }
    }
}

/// Collect everything currently buffered in `rx` without waiting.
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<CoordinatorEvent>) -> Vec<CoordinatorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
