//! Clean-shutdown signal of the sync loop.

use std::fmt;

/// Why the driver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The unit at the configured stop height was dispatched and committed.
    StopHeightReached { stop_height: u64 },
}

/// The driver stopped cleanly. Carries the last fully processed height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    pub final_height: u64,
    pub reason: StopReason,
}

impl Termination {
    pub fn stop_height_reached(final_height: u64, stop_height: u64) -> Self {
        Self {
            final_height,
            reason: StopReason::StopHeightReached { stop_height },
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            StopReason::StopHeightReached { stop_height } => write!(
                f,
                "stopped at height {} (stop height {})",
                self.final_height, stop_height
            ),
        }
    }
}
