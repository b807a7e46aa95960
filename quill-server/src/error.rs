//! Server error types.

use quill_coord::CoordError;
use quill_log::LogError;
use quill_runtime::{ErrorCode, HandlerError};

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Offset allocation, commit tracking or the coordination store failed.
    #[error(transparent)]
    Log(#[from] LogError),

    /// The request violates a limit or carries an invalid key.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] quill_core::Error),
}

impl ServerError {
    /// Converts the error to a wire error code.
    #[must_use]
    pub const fn to_error_code(&self) -> ErrorCode {
        match self {
            Self::Log(LogError::Coord(CoordError::Timeout { .. })) => ErrorCode::Timeout,
            Self::Log(LogError::Coord(_) | LogError::RetriesExhausted { .. }) => {
                ErrorCode::TemporarilyUnavailable
            }
            Self::Log(LogError::OffsetNotAllocated { .. }) | Self::InvalidRequest(_) => {
                ErrorCode::MalformedRequest
            }
            Self::Log(LogError::InvariantViolation { .. }) => ErrorCode::Crash,
        }
    }

    /// Returns true if the node must stop serving after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Log(e) => e.is_fatal(),
            Self::InvalidRequest(_) => false,
        }
    }

    /// Converts the error into the runtime's per-request error.
    #[must_use]
    pub fn to_handler_error(&self) -> HandlerError {
        if self.is_fatal() {
            HandlerError::fatal(self.to_string())
        } else {
            HandlerError::new(self.to_error_code(), self.to_string())
        }
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
