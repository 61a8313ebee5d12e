//! Timestamped event argument.

use std::time::{Duration, Instant};

/// Ready-made handler-argument type: records when the triggering event was
/// created, so handlers can reason about queueing delay.
#[derive(Debug, Clone, Copy)]
pub struct Signal {
    raised_at: Instant,
}

impl Signal {
    /// Captures the current instant.
    pub fn now() -> Self {
        Self {
            raised_at: Instant::now(),
        }
    }

    /// When the signal was created.
    pub fn raised_at(&self) -> Instant {
        self.raised_at
    }

    /// Time elapsed since creation.
    pub fn age(&self) -> Duration {
        self.raised_at.elapsed()
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::now()
    }
}
