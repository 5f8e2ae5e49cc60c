//! Per-host wall-clock budget.
//!
//! An explicit value created at worker start and passed down the call
//! stack; checked at every directory boundary so a probe is never killed
//! mid-request.

use std::time::{Duration, Instant};

use crate::probe::ProbeError;

/// A started wall-clock budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    /// Starts the clock with the given budget.
    #[must_use]
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// Time spent since the worker started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Raises [`ProbeError::Timeout`] once the budget is exceeded.
    ///
    /// # Errors
    ///
    /// Returns the timeout error carrying the elapsed time.
    pub fn check(&self) -> Result<(), ProbeError> {
        let elapsed = self.elapsed();
        if elapsed > self.limit {
            return Err(ProbeError::timeout(elapsed));
        }
        Ok(())
    }
}
