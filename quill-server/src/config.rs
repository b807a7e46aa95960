//! Log service configuration.

use std::time::Duration;

use quill_core::Limits;
use quill_log::RetryPolicy;
use quill_runtime::ConfigError;

/// Configuration for one node's log service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Deadline for each peer's answer during poll reconciliation.
    pub peer_timeout: Duration,
    /// Retry policy for the allocation and commit CAS loops.
    pub retry: RetryPolicy,
    /// Request shape limits.
    pub limits: Limits,
}

impl ServiceConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            peer_timeout: Duration::from_millis(500),
            retry: RetryPolicy::unbounded(),
            limits: Limits::new(),
        }
    }

    /// Sets the peer poll timeout.
    #[must_use]
    pub const fn with_peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout = timeout;
        self
    }

    /// Sets the CAS retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the request limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Creates a configuration suitable for testing (shorter timeouts).
    #[must_use]
    pub const fn fast_for_testing() -> Self {
        Self::new().with_peer_timeout(Duration::from_millis(50))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peer_timeout.is_zero() {
            return Err(ConfigError::InvalidTiming {
                message: "peer_timeout must be positive".to_string(),
            });
        }
        self.retry
            .validate()
            .map_err(|message| ConfigError::InvalidTiming {
                message: message.to_string(),
            })?;
        self.limits
            .validate()
            .map_err(|e| ConfigError::InvalidLimits {
                message: e.to_string(),
            })?;
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}
