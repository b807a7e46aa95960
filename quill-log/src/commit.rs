//! Consumer commit tracking.
//!
//! The commit watermark of a log only moves forward. Commits are
//! cumulative (Kafka-style): committing offset N means "processed everything up
//! to and including N".

use std::collections::BTreeMap;
use std::sync::Arc;

use quill_coord::{CoordStore, CounterKind};
use quill_core::{LogKey, Offset};
use tracing::{debug, error, trace};

use crate::error::{LogError, LogResult};
use crate::retry::RetryPolicy;

/// What a commit did to the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The watermark moved forward.
    Advanced {
        /// The previous watermark (`Offset::ZERO` if never committed).
        from: Offset,
        /// The new watermark.
        to: Offset,
    },
    /// The proposed offset was not ahead of the watermark; nothing changed.
    Unchanged {
        /// The current watermark.
        current: Offset,
    },
}

/// Tracks per-log commit watermarks in the coordination store.
///
/// # Invariant
///
/// `CommittedOffset(key) <= PrevOffset(key)`. Every commit checks it, reading
/// the watermark before the allocation counter: the allocation counter only
/// grows, so a later read of it can never make a legal watermark look too
/// high.
pub struct CommitTracker<S: CoordStore> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S: CoordStore> CommitTracker<S> {
    /// Creates a tracker over a shared coordination store.
    #[must_use]
    pub const fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Moves the watermark of `key` forward to `offset`.
    ///
    /// Older or duplicate commits are silent no-ops.
    ///
    /// # Errors
    ///
    /// - `OffsetNotAllocated` if `offset` was never handed out for `key`.
    /// - `InvariantViolation` if the store is already corrupt (fatal).
    /// - `Coord` / `RetriesExhausted` as for allocation.
    pub async fn commit(&self, key: &LogKey, offset: Offset) -> LogResult<CommitOutcome> {
        let counter = CounterKind::Committed.key_for(key);
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);

            let current = self
                .store
                .read(&counter)
                .await?
                .map_or(Offset::ZERO, Offset::new);
            let prev = self.check_invariant(key, current).await?;

            if offset > prev {
                return Err(LogError::OffsetNotAllocated {
                    key: key.clone(),
                    offset,
                    prev,
                });
            }
            if offset <= current {
                trace!(key = %key, offset = offset.get(), current = current.get(), "Stale commit ignored");
                return Ok(CommitOutcome::Unchanged { current });
            }

            match self
                .store
                .compare_and_swap(&counter, current.get(), offset.get(), true)
                .await
            {
                Ok(()) => {
                    debug!(key = %key, from = current.get(), to = offset.get(), "Committed offset");
                    return Ok(CommitOutcome::Advanced {
                        from: current,
                        to: offset,
                    });
                }
                Err(e) if e.is_conflict() => {
                    trace!(key = %key, current = current.get(), attempt, "Commit lost race");
                    if !self.retry.allows_retry_after(attempt) {
                        return Err(LogError::RetriesExhausted {
                            operation: "commit",
                            key: key.clone(),
                            attempts: attempt,
                        });
                    }
                    self.retry.backoff(attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Returns the watermark of `key`, or `None` if it was never committed.
    ///
    /// # Errors
    ///
    /// Returns `Coord` if a store read fails, or `InvariantViolation` if the
    /// store is corrupt.
    pub async fn committed(&self, key: &LogKey) -> LogResult<Option<Offset>> {
        let counter = CounterKind::Committed.key_for(key);
        let Some(current) = self.store.read(&counter).await?.map(Offset::new) else {
            return Ok(None);
        };
        self.check_invariant(key, current).await?;
        Ok(Some(current))
    }

    /// Returns the watermarks of every key in `keys` that was ever committed.
    ///
    /// Never-committed keys are omitted, not reported as zero.
    ///
    /// # Errors
    ///
    /// Fails on the first key whose lookup fails.
    pub async fn list_committed<'a, I>(&self, keys: I) -> LogResult<BTreeMap<LogKey, Offset>>
    where
        I: IntoIterator<Item = &'a LogKey>,
    {
        let mut offsets = BTreeMap::new();
        for key in keys {
            if let Some(offset) = self.committed(key).await? {
                offsets.insert(key.clone(), offset);
            }
        }
        Ok(offsets)
    }

    /// Reads the allocation counter and verifies `committed` does not exceed
    /// it. Returns the allocation counter.
    async fn check_invariant(&self, key: &LogKey, committed: Offset) -> LogResult<Offset> {
        let prev = self
            .store
            .read(&CounterKind::PrevOffset.key_for(key))
            .await?
            .map_or(Offset::ZERO, Offset::new);

        if committed > prev {
            error!(
                key = %key,
                committed = committed.get(),
                prev = prev.get(),
                "Committed offset exceeds allocated offset; coordination state is corrupt"
            );
            return Err(LogError::InvariantViolation {
                key: key.clone(),
                committed,
                prev,
            });
        }
        Ok(prev)
    }
}

impl<S: CoordStore> Clone for CommitTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry: self.retry,
        }
    }
}
