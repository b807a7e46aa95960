//! In-memory per-node log store.
//!
//! Each node keeps the entries it appended itself plus whatever it learned
//! from peers during reconciliation. Nothing here is durable: the coordination
//! store stays the authority for offsets, so offset uniqueness survives a
//! restart even though entry bodies do not.

#![allow(clippy::significant_drop_tightening)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use quill_core::{LogEntry, LogKey, Offset};
use tracing::warn;

/// Per-node map of log key to entries ordered by offset.
///
/// # Thread Safety
///
/// Every operation takes the inner mutex for the duration of a map update and
/// never across an `.await`, so the store is safe to share between concurrent
/// request handlers.
#[derive(Debug, Default)]
pub struct LogStore {
    logs: Mutex<HashMap<LogKey, BTreeMap<Offset, i64>>>,
}

impl LogStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry.
    ///
    /// Appending an offset that is already present is a no-op. Returns true if
    /// the entry was new.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn append(&self, key: &LogKey, entry: LogEntry) -> bool {
        let mut logs = self.logs.lock().expect("log store lock poisoned");
        let log = logs.entry(key.clone()).or_default();
        Self::insert(key, log, entry)
    }

    /// Folds a batch of entries into one log.
    ///
    /// Same idempotent semantics as [`append`](Self::append). Returns how
    /// many entries were new.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn merge<I>(&self, key: &LogKey, entries: I) -> usize
    where
        I: IntoIterator<Item = LogEntry>,
    {
        let mut entries = entries.into_iter().peekable();
        if entries.peek().is_none() {
            return 0;
        }

        let mut logs = self.logs.lock().expect("log store lock poisoned");
        let log = logs.entry(key.clone()).or_default();
        entries.filter(|entry| Self::insert(key, log, *entry)).count()
    }

    /// Returns every local entry of `key` with `offset >= min_offset`,
    /// ascending by offset.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn range(&self, key: &LogKey, min_offset: Offset) -> Vec<LogEntry> {
        let logs = self.logs.lock().expect("log store lock poisoned");
        logs.get(key).map_or_else(Vec::new, |log| {
            log.range(min_offset..)
                .map(|(offset, value)| LogEntry::new(*offset, *value))
                .collect()
        })
    }

    /// Returns the number of entries held locally for `key`.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn len(&self, key: &LogKey) -> usize {
        let logs = self.logs.lock().expect("log store lock poisoned");
        logs.get(key).map_or(0, BTreeMap::len)
    }

    fn insert(key: &LogKey, log: &mut BTreeMap<Offset, i64>, entry: LogEntry) -> bool {
        match log.get(&entry.offset) {
            None => {
                log.insert(entry.offset, entry.value);
                true
            }
            Some(existing) if *existing == entry.value => false,
            Some(existing) => {
                // Offsets are allocated once, so two values for one offset
                // means a peer is misbehaving. First writer wins.
                warn!(
                    key = %key,
                    offset = entry.offset.get(),
                    kept = *existing,
                    rejected = entry.value,
                    "Conflicting value for existing offset"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(offset: u64, value: i64) -> LogEntry {
        LogEntry::new(Offset::new(offset), value)
    }

    #[test]
    fn test_append_and_range() {
        let store = LogStore::new();
        let key = LogKey::new("k");

        assert!(store.append(&key, entry(1, 10)));
        assert!(store.append(&key, entry(2, 20)));
        assert!(store.append(&key, entry(3, 30)));

        assert_eq!(store.range(&key, Offset::new(1)), vec![entry(1, 10), entry(2, 20), entry(3, 30)]);
        assert_eq!(store.range(&key, Offset::new(2)), vec![entry(2, 20), entry(3, 30)]);
        assert!(store.range(&key, Offset::new(4)).is_empty());
    }

    #[test]
    fn test_range_of_unknown_key_is_empty() {
        let store = LogStore::new();
        assert!(store.range(&LogKey::new("nope"), Offset::ZERO).is_empty());
        assert_eq!(store.len(&LogKey::new("nope")), 0);
    }

    #[test]
    fn test_duplicate_append_is_noop() {
        let store = LogStore::new();
        let key = LogKey::new("k");

        assert!(store.append(&key, entry(1, 10)));
        assert!(!store.append(&key, entry(1, 10)));
        assert_eq!(store.len(&key), 1);
    }

    #[test]
    fn test_conflicting_value_keeps_first() {
        let store = LogStore::new();
        let key = LogKey::new("k");

        store.append(&key, entry(1, 10));
        assert!(!store.append(&key, entry(1, 99)));
        assert_eq!(store.range(&key, Offset::ZERO), vec![entry(1, 10)]);
    }

    #[test]
    fn test_out_of_order_appends_are_sorted() {
        let store = LogStore::new();
        let key = LogKey::new("k");

        store.append(&key, entry(5, 50));
        store.append(&key, entry(2, 20));
        store.append(&key, entry(9, 90));

        let offsets: Vec<u64> = store
            .range(&key, Offset::ZERO)
            .iter()
            .map(|e| e.offset.get())
            .collect();
        assert_eq!(offsets, vec![2, 5, 9]);
    }

    #[test]
    fn test_merge_counts_only_new_entries() {
        let store = LogStore::new();
        let key = LogKey::new("k");
        store.append(&key, entry(1, 10));

        let added = store.merge(&key, vec![entry(1, 10), entry(2, 20), entry(3, 30)]);
        assert_eq!(added, 2);

        let added = store.merge(&key, vec![entry(2, 20), entry(3, 30)]);
        assert_eq!(added, 0);
        assert_eq!(store.len(&key), 3);
    }

    #[test]
    fn test_empty_merge_does_not_create_log() {
        let store = LogStore::new();
        let key = LogKey::new("k");
        assert_eq!(store.merge(&key, Vec::new()), 0);
        assert_eq!(store.len(&key), 0);
        assert!(store.logs.lock().unwrap().is_empty());
    }
}
