//! Bounded exponential backoff for transient fetch failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default first retry delay (1 second).
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Default retry delay ceiling (60 seconds).
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Largest doubling exponent applied; keeps the multiplier inside `u32`.
const MAX_EXPONENT: u32 = 20;

fn default_initial() -> Duration {
    DEFAULT_INITIAL_BACKOFF
}

fn default_max() -> Duration {
    DEFAULT_MAX_BACKOFF
}

/// Backoff configuration shared by all listeners of a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry (default: 1s).
    #[serde(default = "default_initial", with = "humantime_serde")]
    pub initial: Duration,
    /// Upper bound for any single delay (default: 60s).
    #[serde(default = "default_max", with = "humantime_serde")]
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_BACKOFF,
            max: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }
}

/// Per-loop backoff state. Doubles on each failure, resets on success.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay to wait before the next retry, advancing the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32 << self.attempt.min(MAX_EXPONENT);
        self.attempt = self.attempt.saturating_add(1);
        self.policy.initial.saturating_mul(factor).min(self.policy.max)
    }

    /// Consecutive failures since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let mut backoff = Backoff::new(BackoffPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(10),
        ));

        let delays: Vec<_> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
        assert_eq!(backoff.attempt(), 6);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), DEFAULT_INITIAL_BACKOFF);
    }

    #[test]
    fn test_backoff_never_overflows() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        for _ in 0..100 {
            assert!(backoff.next_delay() <= DEFAULT_MAX_BACKOFF);
        }
    }
}
