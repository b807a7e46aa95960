//! Coordination store error types.

use thiserror::Error;

/// Result type for coordination store operations.
pub type CoordResult<T> = Result<T, CoordError>;

/// Errors returned by a coordination store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordError {
    /// The key has never been written.
    #[error("key does not exist: {key}")]
    KeyAbsent {
        /// The missing key.
        key: String,
    },

    /// A compare-and-swap found a different value than expected.
    ///
    /// This is a transient conflict: another writer won the race.
    #[error("precondition failed for {key}: expected {expected}, found {actual:?}")]
    PreconditionFailed {
        /// The key that was swapped.
        key: String,
        /// The value the caller expected.
        expected: u64,
        /// The value actually stored, if the store reported it.
        actual: Option<u64>,
    },

    /// The store (or the transport beneath it) failed.
    #[error("coordination store unavailable during {operation}: {message}")]
    Unavailable {
        /// The operation that failed.
        operation: &'static str,
        /// Error message.
        message: String,
    },

    /// The store did not answer in time.
    #[error("coordination store timed out during {operation} after {waited_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// How long we waited (in milliseconds).
        waited_ms: u64,
    },
}

impl CoordError {
    /// Returns true if this is a compare-and-swap conflict that is safe to retry.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::PreconditionFailed { .. })
    }

    /// Returns true if the error reports a missing key.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::KeyAbsent { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoordError::PreconditionFailed {
            key: "offset/prev/k".into(),
            expected: 4,
            actual: Some(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("offset/prev/k"));
        assert!(msg.contains('4'));
        assert!(msg.contains('5'));

        let err = CoordError::Timeout {
            operation: "cas",
            waited_ms: 1000,
        };
        assert!(err.to_string().contains("1000ms"));
    }

    #[test]
    fn test_classification() {
        let conflict = CoordError::PreconditionFailed {
            key: "k".into(),
            expected: 0,
            actual: None,
        };
        assert!(conflict.is_conflict());
        assert!(!conflict.is_absent());

        let absent = CoordError::KeyAbsent { key: "k".into() };
        assert!(absent.is_absent());
        assert!(!absent.is_conflict());

        let down = CoordError::Unavailable {
            operation: "read",
            message: "connection reset".into(),
        };
        assert!(!down.is_conflict());
        assert!(!down.is_absent());
    }
}
