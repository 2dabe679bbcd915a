//! Reconnect backoff policy.
//!
//! Capped exponential backoff with deterministic jitter. The delay doubles
//! from the configured initial value up to the cap; jitter of up to 25% is
//! derived from the attempt counter so retries from many clients do not
//! align.

use std::time::Duration;

use crate::constants::{DEFAULT_BACKOFF_INITIAL, DEFAULT_BACKOFF_MAX};

/// Backoff policy for one reconnection cycle.
///
/// Retry limits are not decided here: the controller retries until the
/// caller abandons the connection.
#[derive(Debug)]
pub struct ReconnectPolicy {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_INITIAL, DEFAULT_BACKOFF_MAX)
    }
}

impl ReconnectPolicy {
    /// Create a policy with the given initial delay and cap.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, advancing the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;

        let initial_ms = self.initial.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let shift = (self.attempt - 1).min(32);
        let base_ms = initial_ms
            .saturating_mul(1u64 << shift)
            .clamp(initial_ms, max_ms.max(initial_ms));

        // Jitter up to 25% of the base, derived from the attempt count.
        let jitter_range = base_ms / 4;
        let jitter_ms = if jitter_range > 0 {
            (self.attempt as u64 * 17) % jitter_range.max(1)
        } else {
            0
        };

        Duration::from_millis(base_ms + jitter_ms)
    }

    /// The number of delays handed out in this cycle.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Reset for a new reconnection cycle.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
