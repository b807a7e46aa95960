//! Retry policy for optimistic compare-and-swap loops.

use std::time::Duration;

use rand::Rng;

/// Governs how a CAS loop reacts to a conflict.
///
/// The default retries forever with no backoff: contention is expected to be
/// light and every retry re-reads the counter, so each attempt makes progress
/// checking. Tests bound `max_attempts` to make contention deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts before giving up. `None` retries until success.
    pub max_attempts: Option<u32>,
    /// Backoff after the first conflict. Zero disables backoff.
    pub base_backoff: Duration,
    /// Upper bound on a single backoff.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Retries until success with no backoff.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_attempts: None,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Gives up after `attempts` tries with no backoff.
    ///
    /// # Panics
    /// Panics if `attempts` is zero.
    #[must_use]
    pub const fn bounded(attempts: u32) -> Self {
        assert!(attempts > 0, "attempts must be positive");
        Self {
            max_attempts: Some(attempts),
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Builder: set exponential backoff bounds.
    #[must_use]
    pub const fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    /// Returns true if another attempt may follow attempt number `attempt`
    /// (1-based).
    #[must_use]
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }

    /// Returns the backoff to wait after attempt number `attempt`.
    ///
    /// Doubles per attempt up to `max_backoff`, with full jitter.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if self.base_backoff.is_zero() {
            return Duration::ZERO;
        }
        let shift = attempt.saturating_sub(1).min(16);
        let ceiling = self
            .base_backoff
            .saturating_mul(1 << shift)
            .min(self.max_backoff.max(self.base_backoff));
        #[allow(clippy::cast_possible_truncation)]
        let ceiling_us = ceiling.as_micros().min(u128::from(u64::MAX)) as u64;
        Duration::from_micros(rand::thread_rng().gen_range(0..=ceiling_us))
    }

    /// Sleeps for the backoff after attempt number `attempt`.
    pub async fn backoff(&self, attempt: u32) {
        let delay = self.backoff_for(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Validates the policy.
    ///
    /// # Errors
    /// Returns a description of the problem if the bounds are inconsistent.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_attempts == Some(0) {
            return Err("max_attempts must be positive");
        }
        if self.max_backoff < self.base_backoff {
            return Err("max_backoff must be >= base_backoff");
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_always_retries() {
        let policy = RetryPolicy::unbounded();
        assert!(policy.allows_retry_after(1));
        assert!(policy.allows_retry_after(u32::MAX - 1));
        assert_eq!(policy.backoff_for(5), Duration::ZERO);
    }

    #[test]
    fn test_bounded_stops() {
        let policy = RetryPolicy::bounded(3);
        assert!(policy.allows_retry_after(1));
        assert!(policy.allows_retry_after(2));
        assert!(!policy.allows_retry_after(3));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::unbounded()
            .with_backoff(Duration::from_millis(1), Duration::from_millis(8));
        for attempt in 1..20 {
            assert!(policy.backoff_for(attempt) <= Duration::from_millis(8));
        }
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());

        let bad = RetryPolicy::unbounded()
            .with_backoff(Duration::from_millis(10), Duration::from_millis(1));
        assert!(bad.validate().is_err());

        let zero = RetryPolicy {
            max_attempts: Some(0),
            ..RetryPolicy::unbounded()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    #[should_panic(expected = "attempts must be positive")]
    fn test_bounded_zero_panics() {
        let _ = RetryPolicy::bounded(0);
    }
}
