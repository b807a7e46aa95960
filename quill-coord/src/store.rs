//! Coordination store abstraction.
//!
//! Provides the `CoordStore` trait for the shared linearizable counters every
//! node agrees on, and the key layout used for them.

use async_trait::async_trait;
use quill_core::LogKey;

use crate::error::CoordResult;

// -----------------------------------------------------------------------------
// Coordination Store Trait
// -----------------------------------------------------------------------------

/// A linearizable key-value store holding integer counters.
///
/// Implementations must give every operation on a single key a total order
/// that all nodes observe. Quill builds its offset allocator and commit
/// tracker on `compare_and_swap` alone.
#[async_trait]
pub trait CoordStore: Send + Sync {
    /// Reads the value of `key`.
    ///
    /// Returns `None` if the key has never been written.
    async fn read(&self, key: &str) -> CoordResult<Option<u64>>;

    /// Unconditionally writes `value` to `key`.
    async fn write(&self, key: &str, value: u64) -> CoordResult<()>;

    /// Atomically replaces `expected` with `new`.
    ///
    /// If the key is absent and `create_if_missing` is set, the key is created
    /// holding `new`. If it is absent and the flag is clear, returns
    /// `KeyAbsent`.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` if the stored value differs from
    /// `expected`.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: u64,
        new: u64,
        create_if_missing: bool,
    ) -> CoordResult<()>;
}

#[async_trait]
impl<S: CoordStore + ?Sized> CoordStore for std::sync::Arc<S> {
    async fn read(&self, key: &str) -> CoordResult<Option<u64>> {
        (**self).read(key).await
    }

    async fn write(&self, key: &str, value: u64) -> CoordResult<()> {
        (**self).write(key, value).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: u64,
        new: u64,
        create_if_missing: bool,
    ) -> CoordResult<()> {
        (**self)
            .compare_and_swap(key, expected, new, create_if_missing)
            .await
    }
}

// -----------------------------------------------------------------------------
// Key Layout
// -----------------------------------------------------------------------------

/// Which per-log counter a coordination key names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    /// The last offset allocated for the log.
    PrevOffset,
    /// The highest offset a consumer committed for the log.
    Committed,
}

impl CounterKind {
    const fn prefix(self) -> &'static str {
        match self {
            Self::PrevOffset => "offset/prev/",
            Self::Committed => "offset/committed/",
        }
    }

    /// Returns the coordination store key holding this counter for `log`.
    #[must_use]
    pub fn key_for(self, log: &LogKey) -> String {
        let prefix = self.prefix();
        let mut key = String::with_capacity(prefix.len() + log.len());
        key.push_str(prefix);
        key.push_str(log.as_str());
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_keys_are_disjoint() {
        let log = LogKey::new("orders");
        let prev = CounterKind::PrevOffset.key_for(&log);
        let committed = CounterKind::Committed.key_for(&log);
        assert_eq!(prev, "offset/prev/orders");
        assert_eq!(committed, "offset/committed/orders");
        assert_ne!(prev, committed);
    }

    #[test]
    fn test_counter_keys_keep_separators() {
        let log = LogKey::new("a/b-c");
        assert_eq!(
            CounterKind::PrevOffset.key_for(&log),
            "offset/prev/a/b-c"
        );
    }
}
