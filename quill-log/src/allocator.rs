//! Offset allocation.
//!
//! Every node allocates offsets through the same `PrevOffset(key)` counter in
//! the coordination store, so two `send`s for one key can never receive the
//! same offset no matter which nodes serve them.

use std::sync::Arc;

use quill_coord::{CoordStore, CounterKind};
use quill_core::{LogKey, Offset};
use tracing::{debug, trace};

use crate::error::{LogError, LogResult};
use crate::retry::RetryPolicy;

/// Hands out strictly increasing, gap-free offsets per log.
///
/// # Algorithm
///
/// 1. Read `PrevOffset(key)`; an absent counter reads as `0`.
/// 2. `compare_and_swap(prev, prev + 1, create_if_missing = true)`.
/// 3. On success `prev + 1` is ours. On a conflict, re-read and retry.
///
/// The first offset allocated for any key is therefore `1`.
pub struct OffsetAllocator<S: CoordStore> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S: CoordStore> OffsetAllocator<S> {
    /// Creates an allocator over a shared coordination store.
    #[must_use]
    pub const fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Allocates the next offset for `key`.
    ///
    /// # Errors
    ///
    /// Returns `Coord` if the store fails with anything but a conflict, or
    /// `RetriesExhausted` if the retry policy gives up.
    pub async fn allocate(&self, key: &LogKey) -> LogResult<Offset> {
        let counter = CounterKind::PrevOffset.key_for(key);
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);

            let prev = self
                .store
                .read(&counter)
                .await?
                .map_or(Offset::ZERO, Offset::new);
            let next = prev.next();

            match self
                .store
                .compare_and_swap(&counter, prev.get(), next.get(), true)
                .await
            {
                Ok(()) => {
                    debug!(key = %key, offset = next.get(), attempt, "Allocated offset");
                    return Ok(next);
                }
                Err(e) if e.is_conflict() => {
                    trace!(key = %key, prev = prev.get(), attempt, "Allocation lost race");
                    if !self.retry.allows_retry_after(attempt) {
                        return Err(LogError::RetriesExhausted {
                            operation: "allocate",
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

    /// Returns the last offset allocated for `key`, or `Offset::ZERO` if none.
    ///
    /// # Errors
    ///
    /// Returns `Coord` if the store read fails.
    pub async fn last_allocated(&self, key: &LogKey) -> LogResult<Offset> {
        let counter = CounterKind::PrevOffset.key_for(key);
        Ok(self
            .store
            .read(&counter)
            .await?
            .map_or(Offset::ZERO, Offset::new))
    }
}

impl<S: CoordStore> Clone for OffsetAllocator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry: self.retry,
        }
    }
}
