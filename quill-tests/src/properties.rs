//! Property definitions and checkers for Quill simulation tests.
//!
//! Tests record every successful client operation into a
//! [`PropertyChecker`]; `check` then verifies the history against the
//! guarantees a Quill cluster makes to its clients.

use std::collections::{BTreeMap, BTreeSet};

use quill_core::{LogEntry, LogKey, Offset};

// ============================================================================
// Property Violation Types
// ============================================================================

/// A violation of a client-visible guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// Two acknowledged sends received the same offset.
    DuplicateOffset {
        /// The log.
        key: LogKey,
        /// The offset handed out twice.
        offset: Offset,
    },
    /// The acknowledged offsets of a log are not exactly `1..=n`.
    OffsetGap {
        /// The log.
        key: LogKey,
        /// Number of acknowledged sends.
        sends: usize,
        /// Highest acknowledged offset.
        max_offset: Offset,
    },
    /// A poll returned an entry below the requested offset.
    PollBelowMinimum {
        /// The log.
        key: LogKey,
        /// The requested minimum.
        min: Offset,
        /// The offending offset.
        offset: Offset,
    },
    /// A poll result was not strictly ascending by offset.
    PollUnordered {
        /// The log.
        key: LogKey,
    },
    /// A poll returned a value other than the one sent at that offset.
    ValueMismatch {
        /// The log.
        key: LogKey,
        /// The offset.
        offset: Offset,
        /// The value acknowledged by `send`.
        sent: i64,
        /// The value returned by `poll`.
        polled: i64,
    },
    /// A listed watermark was below an acknowledged commit.
    CommitRegressed {
        /// The log.
        key: LogKey,
        /// The acknowledged commit.
        committed: Offset,
        /// The watermark listed afterwards.
        listed: Option<Offset>,
    },
    /// A listed watermark was never committed by any client.
    PhantomCommit {
        /// The log.
        key: LogKey,
        /// The listed watermark.
        listed: Offset,
    },
}

impl std::fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateOffset { key, offset } => {
                write!(f, "Offset {offset} of {key} acknowledged twice")
            }
            Self::OffsetGap {
                key,
                sends,
                max_offset,
            } => write!(
                f,
                "Log {key} has {sends} acknowledged sends but max offset {max_offset}"
            ),
            Self::PollBelowMinimum { key, min, offset } => {
                write!(f, "Poll of {key} from {min} returned offset {offset}")
            }
            Self::PollUnordered { key } => write!(f, "Poll of {key} was not strictly ascending"),
            Self::ValueMismatch {
                key,
                offset,
                sent,
                polled,
            } => write!(
                f,
                "Offset {offset} of {key} was sent as {sent} but polled as {polled}"
            ),
            Self::CommitRegressed {
                key,
                committed,
                listed,
            } => write!(
                f,
                "Commit {committed} of {key} acknowledged but later listed as {listed:?}"
            ),
            Self::PhantomCommit { key, listed } => {
                write!(f, "Log {key} listed at {listed} but never committed")
            }
        }
    }
}

// ============================================================================
// Property Checker
// ============================================================================

/// Records a client history and checks it.
#[derive(Debug, Default)]
pub struct PropertyChecker {
    /// Acknowledged sends: key -> offset -> value(s).
    sends: BTreeMap<LogKey, BTreeMap<Offset, Vec<i64>>>,
    /// Highest acknowledged commit per key.
    commits: BTreeMap<LogKey, Offset>,
    /// Every offset any client asked to commit (acknowledged or not).
    attempted_commits: BTreeMap<LogKey, BTreeSet<Offset>>,
    /// Violations found while recording.
    violations: Vec<PropertyViolation>,
}

impl PropertyChecker {
    /// Creates an empty checker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an acknowledged `send`.
    pub fn record_send(&mut self, key: &LogKey, value: i64, offset: Offset) {
        self.sends
            .entry(key.clone())
            .or_default()
            .entry(offset)
            .or_default()
            .push(value);
    }

    /// Records a successful `poll` of `key` from `min`.
    ///
    /// Checks ordering, the minimum and values immediately; values are only
    /// compared for offsets whose `send` was already recorded.
    pub fn record_poll(&mut self, key: &LogKey, min: Offset, entries: &[LogEntry]) {
        if entries.windows(2).any(|w| w[0].offset >= w[1].offset) {
            self.violations
                .push(PropertyViolation::PollUnordered { key: key.clone() });
        }

        for entry in entries {
            if entry.offset < min {
                self.violations.push(PropertyViolation::PollBelowMinimum {
                    key: key.clone(),
                    min,
                    offset: entry.offset,
                });
            }
            let sent = self
                .sends
                .get(key)
                .and_then(|log| log.get(&entry.offset))
                .and_then(|values| values.first());
            if let Some(&sent) = sent {
                if sent != entry.value {
                    self.violations.push(PropertyViolation::ValueMismatch {
                        key: key.clone(),
                        offset: entry.offset,
                        sent,
                        polled: entry.value,
                    });
                }
            }
        }
    }

    /// Records that a client asked to commit `offset` (before the reply).
    pub fn record_commit_attempt(&mut self, key: &LogKey, offset: Offset) {
        self.attempted_commits
            .entry(key.clone())
            .or_default()
            .insert(offset);
    }

    /// Records an acknowledged commit.
    pub fn record_commit(&mut self, key: &LogKey, offset: Offset) {
        self.record_commit_attempt(key, offset);
        let committed = self.commits.entry(key.clone()).or_insert(offset);
        if offset > *committed {
            *committed = offset;
        }
    }

    /// Records the answer to `list_committed_offsets(keys)`.
    pub fn record_list(&mut self, keys: &[LogKey], listed: &BTreeMap<LogKey, Offset>) {
        for key in keys {
            let listed_offset = listed.get(key).copied();
            if let Some(&committed) = self.commits.get(key) {
                if listed_offset.map_or(true, |l| l < committed) {
                    self.violations.push(PropertyViolation::CommitRegressed {
                        key: key.clone(),
                        committed,
                        listed: listed_offset,
                    });
                }
            }
            if let Some(listed_offset) = listed_offset {
                let attempted = self
                    .attempted_commits
                    .get(key)
                    .is_some_and(|offsets| offsets.contains(&listed_offset));
                if !attempted {
                    self.violations.push(PropertyViolation::PhantomCommit {
                        key: key.clone(),
                        listed: listed_offset,
                    });
                }
            }
        }
    }

    /// Returns the number of acknowledged sends.
    #[must_use]
    pub fn send_count(&self) -> usize {
        self.sends
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Checks the full history and returns every violation found.
    #[must_use]
    pub fn check(&self) -> Vec<PropertyViolation> {
        let mut violations = self.violations.clone();

        for (key, log) in &self.sends {
            for (offset, values) in log {
                if values.len() > 1 {
                    violations.push(PropertyViolation::DuplicateOffset {
                        key: key.clone(),
                        offset: *offset,
                    });
                }
            }

            let sends: usize = log.values().map(Vec::len).sum();
            let max_offset = log.keys().next_back().copied().unwrap_or(Offset::ZERO);
            let gap_free = log.keys().copied().eq((1..=max_offset.get()).map(Offset::new));
            if !gap_free || sends as u64 != max_offset.get() {
                violations.push(PropertyViolation::OffsetGap {
                    key: key.clone(),
                    sends,
                    max_offset,
                });
            }
        }

        violations
    }

    /// Panics with every violation if the history is not clean.
    ///
    /// # Panics
    ///
    /// Panics if [`check`](Self::check) finds any violation.
    pub fn assert_clean(&self) {
        let violations = self.check();
        assert!(
            violations.is_empty(),
            "property violations:\n{}",
            violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> LogKey {
        LogKey::new("k")
    }

    #[test]
    fn test_clean_history() {
        let mut checker = PropertyChecker::new();
        checker.record_send(&key(), 10, Offset::new(1));
        checker.record_send(&key(), 20, Offset::new(2));
        checker.record_poll(
            &key(),
            Offset::new(1),
            &[
                LogEntry::new(Offset::new(1), 10),
                LogEntry::new(Offset::new(2), 20),
            ],
        );
        checker.record_commit(&key(), Offset::new(2));
        checker.record_list(&[key()], &std::iter::once((key(), Offset::new(2))).collect());
        assert!(checker.check().is_empty());
        assert_eq!(checker.send_count(), 2);
    }

    #[test]
    fn test_detects_duplicate_and_gap() {
        let mut checker = PropertyChecker::new();
        checker.record_send(&key(), 1, Offset::new(1));
        checker.record_send(&key(), 2, Offset::new(1));
        checker.record_send(&key(), 3, Offset::new(3));
        let violations = checker.check();
        assert!(violations.contains(&PropertyViolation::DuplicateOffset {
            key: key(),
            offset: Offset::new(1)
        }));
        assert!(violations
            .iter()
            .any(|v| matches!(v, PropertyViolation::OffsetGap { .. })));
    }

    #[test]
    fn test_detects_bad_polls() {
        let mut checker = PropertyChecker::new();
        checker.record_send(&key(), 10, Offset::new(1));
        checker.record_poll(
            &key(),
            Offset::new(2),
            &[
                LogEntry::new(Offset::new(1), 11),
                LogEntry::new(Offset::new(1), 11),
            ],
        );
        let violations = checker.check();
        assert!(violations.contains(&PropertyViolation::PollUnordered { key: key() }));
        assert!(violations
            .iter()
            .any(|v| matches!(v, PropertyViolation::PollBelowMinimum { .. })));
        assert!(violations
            .iter()
            .any(|v| matches!(v, PropertyViolation::ValueMismatch { .. })));
    }

    #[test]
    fn test_detects_commit_regression_and_phantom() {
        let mut checker = PropertyChecker::new();
        checker.record_commit(&key(), Offset::new(5));
        checker.record_list(&[key()], &std::iter::once((key(), Offset::new(3))).collect());

        let other = LogKey::new("other");
        checker.record_list(&[other.clone()], &std::iter::once((other, Offset::new(1))).collect());

        let violations = checker.check();
        assert!(violations
            .iter()
            .any(|v| matches!(v, PropertyViolation::CommitRegressed { .. })));
        assert!(violations
            .iter()
            .any(|v| matches!(v, PropertyViolation::PhantomCommit { .. })));
    }
}
