//! Delay primitive: stands in for the I/O or CPU work of an operation.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DelayError;
use crate::request::OperationRequest;

/// Suspends the calling task for the request's duration.
///
/// Implementations must not touch coordinator state; any lock the caller
/// holds stays held for the whole wait.
#[async_trait]
pub trait Delay: Send + Sync + 'static {
    async fn wait(&self, request: &OperationRequest) -> Result<(), DelayError>;
}

/// Sleeps on the tokio timer for `duration * scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepDelay {
    scale: f64,
}

impl SleepDelay {
    pub fn new() -> Self {
        Self { scale: 1.0 }
    }

    /// Compress or stretch every wait.
    ///
    /// A negative or NaN scale collapses waits to zero; a product too large
    /// for `Duration` saturates at `Duration::MAX`.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn scaled(&self, duration: Duration) -> Duration {
        let secs = duration.as_secs_f64() * self.scale;
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl Default for SleepDelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Delay for SleepDelay {
    async fn wait(&self, request: &OperationRequest) -> Result<(), DelayError> {
        tokio::time::sleep(self.scaled(request.duration)).await;
        Ok(())
    }
}
