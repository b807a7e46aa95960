//! Poll reconciliation across peers.
//!
//! Nodes never push entries. A node only learns entries appended elsewhere
//! when a client polls it: the node asks every peer for the same ranges,
//! merges what answers in time with its own entries, and keeps the merged
//! result locally.
//!
//! # Merge Rules
//!
//! - Entries are unioned per key by offset; the result is ascending with no
//!   duplicate offsets.
//! - Only requested keys, and only entries with `offset >= requested`, are
//!   kept, whatever a peer sent.
//! - A peer that errors or misses the deadline contributes nothing. The
//!   deadline is the transport's own rpc timeout, set to the peer timeout.

use std::collections::BTreeMap;

use futures::future::join_all;
use quill_coord::CoordStore;
use quill_core::{LogEntry, LogKey, NodeId, Offset};
use quill_runtime::{Payload, RuntimeError, Transport};
use tracing::{debug, trace};

use crate::service::LogService;

/// Entries per log, as carried by `poll_ok`.
pub(crate) type PollResult = BTreeMap<LogKey, Vec<LogEntry>>;

impl<S: CoordStore, T: Transport> LogService<S, T> {
    /// Polls every peer except `requester` in parallel and returns the
    /// answers that arrived in time.
    pub(crate) async fn gather_from_peers(
        &self,
        requester: &NodeId,
        offsets: &BTreeMap<LogKey, Offset>,
    ) -> Vec<PollResult> {
        if offsets.is_empty() {
            return Vec::new();
        }
        let peers: Vec<NodeId> = self
            .transport
            .peers()
            .into_iter()
            .filter(|peer| peer != requester)
            .collect();
        if peers.is_empty() {
            return Vec::new();
        }

        let answers = join_all(peers.iter().map(|peer| self.poll_peer(peer, offsets.clone()))).await;
        let answered = answers.iter().filter(|a| a.is_some()).count();
        trace!(
            node_id = %self.node_id(),
            asked = peers.len(),
            answered,
            "Gathered peer polls"
        );
        answers.into_iter().flatten().collect()
    }

    async fn poll_peer(&self, peer: &NodeId, offsets: BTreeMap<LogKey, Offset>) -> Option<PollResult> {
        let timeout = self.config.peer_timeout;
        match self.transport.call(peer, Payload::Poll { offsets }, timeout).await {
            Ok(Payload::PollOk { msgs }) => Some(msgs),
            Ok(other) => {
                debug!(peer = %peer, reply = other.kind(), "Unexpected peer poll reply");
                None
            }
            Err(RuntimeError::Timeout { waited_ms, .. }) => {
                debug!(peer = %peer, waited_ms, "Peer poll timed out");
                None
            }
            Err(e) => {
                debug!(peer = %peer, error = %e, "Peer poll failed");
                None
            }
        }
    }
}

/// Unions local and peer entries for the requested ranges.
///
/// On the same offset the earlier source wins; `local` is consulted first.
/// Keys with no entries are left out.
pub(crate) fn merge_results(
    requested: &BTreeMap<LogKey, Offset>,
    local: PollResult,
    remote: Vec<PollResult>,
) -> PollResult {
    let mut merged: BTreeMap<LogKey, BTreeMap<Offset, i64>> = BTreeMap::new();

    for source in std::iter::once(local).chain(remote) {
        for (key, entries) in source {
            let Some(min_offset) = requested.get(&key) else {
                continue;
            };
            let log = merged.entry(key).or_default();
            for entry in entries.into_iter().filter(|e| e.offset >= *min_offset) {
                log.entry(entry.offset).or_insert(entry.value);
            }
        }
    }

    merged
        .into_iter()
        .filter(|(_, log)| !log.is_empty())
        .map(|(key, log)| {
            let entries = log
                .into_iter()
                .map(|(offset, value)| LogEntry::new(offset, value))
                .collect();
            (key, entries)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(u64, i64)]) -> Vec<LogEntry> {
        pairs
            .iter()
            .map(|(offset, value)| LogEntry::new(Offset::new(*offset), *value))
            .collect()
    }

    fn result(key: &str, pairs: &[(u64, i64)]) -> PollResult {
        std::iter::once((LogKey::new(key), entries(pairs))).collect()
    }

    fn request(key: &str, min: u64) -> BTreeMap<LogKey, Offset> {
        std::iter::once((LogKey::new(key), Offset::new(min))).collect()
    }

    #[test]
    fn test_merge_unions_and_sorts() {
        let merged = merge_results(
            &request("k", 1),
            result("k", &[(1, 10), (4, 40)]),
            vec![result("k", &[(3, 30), (2, 20)]), result("k", &[(4, 40), (5, 50)])],
        );
        assert_eq!(
            merged[&LogKey::new("k")],
            entries(&[(1, 10), (2, 20), (3, 30), (4, 40), (5, 50)])
        );
    }

    #[test]
    fn test_merge_filters_below_minimum() {
        let merged = merge_results(
            &request("k", 3),
            result("k", &[(3, 30)]),
            vec![result("k", &[(1, 10), (2, 20), (4, 40)])],
        );
        assert_eq!(merged[&LogKey::new("k")], entries(&[(3, 30), (4, 40)]));
    }

    #[test]
    fn test_merge_ignores_unrequested_keys() {
        let merged = merge_results(
            &request("k", 1),
            PollResult::new(),
            vec![result("other", &[(1, 1)]), result("k", &[(1, 7)])],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[&LogKey::new("k")], entries(&[(1, 7)]));
    }

    #[test]
    fn test_merge_local_wins_on_conflict() {
        let merged = merge_results(
            &request("k", 1),
            result("k", &[(1, 10)]),
            vec![result("k", &[(1, 99)])],
        );
        assert_eq!(merged[&LogKey::new("k")], entries(&[(1, 10)]));
    }

    #[test]
    fn test_merge_omits_empty_keys() {
        let merged = merge_results(&request("k", 5), result("k", &[(1, 10)]), Vec::new());
        assert!(merged.is_empty());
    }

    #[test]
    fn test_merge_is_stable_under_repetition() {
        let requested = request("k", 1);
        let once = merge_results(
            &requested,
            result("k", &[(2, 20)]),
            vec![result("k", &[(1, 10)])],
        );
        let twice = merge_results(&requested, once.clone(), vec![once.clone(), once.clone()]);
        assert_eq!(once, twice);
    }
}
