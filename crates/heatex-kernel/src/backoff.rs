//! [`BackoffPolicy`] – exponential retry delays for the realtime channel.
//!
//! `delay(n) = min(base_delay * multiplier^n, max_delay)` where `n` is the
//! number of retries already scheduled.  With the defaults the sequence is
//! 2 s, 3 s, 4.5 s, 6.75 s, 10.125 s and the budget is five retries.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use heatex_kernel::backoff::BackoffPolicy;
//!
//! let policy = BackoffPolicy::default();
//! assert_eq!(policy.delay_for(0), Duration::from_millis(2000));
//! assert_eq!(policy.delay_for(2), Duration::from_millis(4500));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_BASE_DELAY_MS: u64 = 2_000;
const DEFAULT_MULTIPLIER: f64 = 1.5;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Retry timing and budget for abnormal channel closures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Retries allowed before the channel is declared failed.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the retry that follows `attempt` earlier retries.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// `true` while another retry fits in the budget.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
