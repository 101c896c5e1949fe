//! Bounded retry with exponential backoff
//!
//! Single retry utility for upstream page fetches. Delay grows by
//! `base * multiplier^(attempt-1)`, capped, with additive jitter so
//! concurrent syncs do not retry in lockstep.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, first try included
    pub max_attempts: u32,
    /// Base delay in milliseconds
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier per attempt
    pub backoff_multiplier: f64,
    /// Additive jitter range in milliseconds
    pub jitter_range_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_range_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt` tries
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential_delay =
            (self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32 - 1)) as u64;

        let capped_delay = std::cmp::min(exponential_delay, self.max_delay_ms);
        let jitter = fastrand::u64(0..=self.jitter_range_ms);

        Duration::from_millis(capped_delay + jitter)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn delay_grows_exponentially_within_jitter_bounds() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_range_ms: 100,
        };

        let delay1 = policy.delay_for(1);
        assert!(delay1 >= Duration::from_millis(1000));
        assert!(delay1 <= Duration::from_millis(1100));

        let delay2 = policy.delay_for(2);
        assert!(delay2 >= Duration::from_millis(2000));
        assert!(delay2 <= Duration::from_millis(2100));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 1000,
            max_delay_ms: 4000,
            backoff_multiplier: 2.0,
            jitter_range_ms: 0,
        };

        assert_eq!(policy.delay_for(9), Duration::from_millis(4000));
    }
}
