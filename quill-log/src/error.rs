//! Log error types.

use quill_coord::CoordError;
use quill_core::{LogKey, Offset};
use thiserror::Error;

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors that can occur while allocating, committing or reading offsets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogError {
    /// The coordination store failed with a non-retryable error.
    #[error(transparent)]
    Coord(#[from] CoordError),

    /// The retry policy gave up on a contended compare-and-swap.
    #[error("{operation} for {key} gave up after {attempts} conflicting attempts")]
    RetriesExhausted {
        /// The operation that was retried.
        operation: &'static str,
        /// The log being updated.
        key: LogKey,
        /// How many attempts were made.
        attempts: u32,
    },

    /// A consumer tried to commit an offset that was never allocated.
    #[error("cannot commit offset {offset} for {key}: only {prev} allocated")]
    OffsetNotAllocated {
        /// The log being committed.
        key: LogKey,
        /// The offset the consumer asked for.
        offset: Offset,
        /// The last offset allocated for the log.
        prev: Offset,
    },

    /// The coordination store holds a committed offset beyond the last
    /// allocated one. Shared state is corrupt.
    #[error("invariant violated for {key}: committed {committed} > allocated {prev}")]
    InvariantViolation {
        /// The corrupt log.
        key: LogKey,
        /// The stored commit watermark.
        committed: Offset,
        /// The stored allocation counter.
        prev: Offset,
    },
}

impl LogError {
    /// Returns true if the node must stop serving after this error.
    ///
    /// Continuing past corrupt coordination state risks handing out
    /// inconsistent offsets.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }
}
