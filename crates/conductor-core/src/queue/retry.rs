//! Retry policy: decides when a failed task becomes eligible again.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff policy for transient task failures.
///
/// `delay = base_delay * multiplier^(attempt - 1)`. The engine default is
/// immediate requeue (zero base delay); exponential backoff is opt-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// No delay: a retrying task is eligible on the next queue pass.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    pub fn exponential(base_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay,
            multiplier,
        }
    }

    /// Delay before the next retry, given the number of failed attempts so
    /// far (1-indexed).
    pub fn next_delay(&self, attempts: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempts.saturating_sub(1) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}
