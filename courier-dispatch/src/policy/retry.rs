//! Retry policy for a single send.
//!
//! Kept separate from the controller that applies it so the timing rules can
//! be tested without a relay.

use std::time::Duration;

use rand::Rng;

/// How many times a send is attempted and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. A job is attempted at most
    /// `max_retries + 1` times.
    pub max_retries: u32,
    /// Upper bound for a single attempt.
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_multiplier: f64,
    pub backoff_cap: Duration,
    /// Randomises each backoff within ±`jitter_factor` of its value.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            attempt_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            backoff_multiplier: 1.5,
            backoff_cap: Duration::from_secs(10),
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether another attempt follows a failure of attempt `attempt_index`
    /// (zero-based).
    #[must_use]
    pub const fn should_retry(&self, attempt_index: u32) -> bool {
        attempt_index < self.max_retries
    }

    /// Delay after the failure of attempt `attempt_index` (zero-based):
    /// `min(base * multiplier^attempt_index, cap)`, then jittered.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn backoff(&self, attempt_index: u32) -> Duration {
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        let cap_ms = self.backoff_cap.as_millis() as f64;
        let delay_ms =
            (self.backoff_base.as_millis() as f64 * self.backoff_multiplier.powi(exponent))
                .min(cap_ms);

        let delay_ms = if self.jitter_factor > 0.0 {
            let range = delay_ms * self.jitter_factor;
            let jitter: f64 = rand::rng().random_range(-range..=range);
            (delay_ms + jitter).max(0.0)
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms.round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn backoff_grows_by_multiplier() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff(1), Duration::from_millis(1500));
        assert_eq!(policy.backoff(2), Duration::from_millis(2250));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff(6), Duration::from_secs(10));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = RetryPolicy {
            jitter_factor: 0.2,
            ..RetryPolicy::default()
        };

        for _ in 0..100 {
            let delay = policy.backoff(1);
            assert!(delay >= Duration::from_millis(1200));
            assert!(delay <= Duration::from_millis(1800));
        }
    }

    #[test]
    fn attempts_are_bounded_by_max_retries() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };

        assert_eq!(policy.max_attempts(), 3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }
}
