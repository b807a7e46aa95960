//! Runtime configuration.

use std::time::Duration;

use quill_core::NodeId;
use thiserror::Error;

/// Name of the linearizable key-value service nodes coordinate through.
pub const DEFAULT_COORD_SERVICE: &str = "lin-kv";

/// Configuration for the node runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Deadline for any outbound RPC (peer or coordination store).
    pub rpc_timeout: Duration,
    /// Node id of the coordination store service.
    pub coord_service: NodeId,
}

impl RuntimeConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(1),
            coord_service: NodeId::new(DEFAULT_COORD_SERVICE),
        }
    }

    /// Sets the RPC timeout.
    #[must_use]
    pub const fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Sets the coordination store service name.
    #[must_use]
    pub fn with_coord_service(mut self, service: NodeId) -> Self {
        self.coord_service = service;
        self
    }

    /// Creates a configuration suitable for testing (shorter timeouts).
    #[must_use]
    pub fn fast_for_testing() -> Self {
        Self::new().with_rpc_timeout(Duration::from_millis(100))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_timeout.is_zero() {
            return Err(ConfigError::InvalidTiming {
                message: "rpc_timeout must be positive".to_string(),
            });
        }
        if self.coord_service.is_empty() {
            return Err(ConfigError::InvalidTopology {
                message: "coord_service must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid timing configuration.
    #[error("invalid timing: {message}")]
    InvalidTiming {
        /// Error description.
        message: String,
    },
    /// Invalid node or service naming.
    #[error("invalid topology: {message}")]
    InvalidTopology {
        /// Error description.
        message: String,
    },
    /// Invalid request limits.
    #[error("invalid limits: {message}")]
    InvalidLimits {
        /// Error description.
        message: String,
    },
}
