//! Retry policy for the remote embedding backend.
//!
//! One retry by default: a transient upstream failure gets a second chance,
//! then the record is dropped from the dense index by the caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential-backoff retry configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retry attempts after the first try.
    pub max_retries: u32,
    /// Base delay in milliseconds for the first retry.
    pub base_delay_ms: u64,
    /// Cap on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    /// Delay before retry `attempt` (1-indexed): `base * 2^(attempt-1)`,
    /// capped at `max_delay_ms`. Attempt 0 is the initial try.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64 << (attempt - 1).min(16));
        Duration::from_millis(exp.min(self.max_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_single_retry() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.max_retries, 1);
    }

    #[test]
    fn delays_double_and_cap() {
        let cfg = RetryConfig {
            max_retries: 4,
            base_delay_ms: 100,
            max_delay_ms: 300,
        };
        assert_eq!(cfg.delay_for(0), Duration::ZERO);
        assert_eq!(cfg.delay_for(1), Duration::from_millis(100));
        assert_eq!(cfg.delay_for(2), Duration::from_millis(200));
        assert_eq!(cfg.delay_for(3), Duration::from_millis(300));
        assert_eq!(cfg.delay_for(4), Duration::from_millis(300));
    }
}
