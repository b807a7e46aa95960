//! Multi-node integration tests over the simulated cluster.
//!
//! Every test drives real `LogService` nodes through client requests; only
//! the network and the coordination store are simulated.

// Test-specific lint allowances.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::too_many_lines)]

use std::collections::BTreeSet;

use futures::future::join_all;
use quill_core::{LogEntry, LogKey, Offset};
use quill_runtime::{ErrorCode, Payload};

use crate::scenarios::clusters::{SINGLE_NODE, THREE_NODE, TWO_NODE};
use crate::simulated_cluster::SimulatedCluster;

fn entries(pairs: &[(u64, i64)]) -> Vec<LogEntry> {
    pairs
        .iter()
        .map(|(offset, value)| LogEntry::new(Offset::new(*offset), *value))
        .collect()
}

// ============================================================================
// End-to-End Scenarios
// ============================================================================

#[tokio::test]
async fn test_cluster_single_node_end_to_end() {
    let cluster = SimulatedCluster::new(SINGLE_NODE, 42);

    assert_eq!(cluster.send(0, "k", 10).await.unwrap(), Offset::new(1));
    assert_eq!(cluster.send(0, "k", 20).await.unwrap(), Offset::new(2));

    let msgs = cluster.poll(0, &[("k", 1)]).await.unwrap();
    assert_eq!(msgs[&LogKey::new("k")], entries(&[(1, 10), (2, 20)]));

    cluster.commit(0, &[("k", 2)]).await.unwrap();
    let offsets = cluster.list(0, &["k"]).await.unwrap();
    assert_eq!(offsets.get(&LogKey::new("k")), Some(&Offset::new(2)));
}

#[tokio::test]
async fn test_cluster_two_node_reconciliation() {
    let cluster = SimulatedCluster::new(TWO_NODE, 7);

    assert_eq!(cluster.send(0, "k", 7).await.unwrap(), Offset::FIRST);

    let msgs = cluster.poll(1, &[("k", 1)]).await.unwrap();
    assert_eq!(msgs[&LogKey::new("k")], entries(&[(1, 7)]));

    // The polled node keeps what it learned.
    assert_eq!(cluster.node(1).logs().len(&LogKey::new("k")), 1);
}

#[tokio::test]
async fn test_cluster_interleaved_sends_merge_in_order() {
    let cluster = SimulatedCluster::new(THREE_NODE, 3);

    for (i, value) in (1..=9).enumerate() {
        let offset = cluster.send(i % THREE_NODE, "k", value).await.unwrap();
        assert_eq!(offset, Offset::new(i as u64 + 1));
    }

    let expected: Vec<LogEntry> = (1..=9)
        .map(|v| LogEntry::new(Offset::new(v as u64), v))
        .collect();
    for node in 0..THREE_NODE {
        let msgs = cluster.poll(node, &[("k", 1)]).await.unwrap();
        assert_eq!(msgs[&LogKey::new("k")], expected);
    }
}

// ============================================================================
// Offset Allocation
// ============================================================================

#[tokio::test]
async fn test_cluster_concurrent_sends_are_gap_free() {
    let cluster = SimulatedCluster::new(THREE_NODE, 11);
    let count: usize = 30;

    let sends = (0..count).map(|i| cluster.send(i % THREE_NODE, "k", i as i64));
    let offsets: BTreeSet<u64> = join_all(sends)
        .await
        .into_iter()
        .map(|r| r.unwrap().get())
        .collect();

    assert_eq!(offsets, (1..=count as u64).collect());
}

#[tokio::test]
async fn test_cluster_keys_have_independent_offsets() {
    let cluster = SimulatedCluster::new(TWO_NODE, 12);

    assert_eq!(cluster.send(0, "a", 1).await.unwrap(), Offset::new(1));
    assert_eq!(cluster.send(1, "b", 1).await.unwrap(), Offset::new(1));
    assert_eq!(cluster.send(1, "a", 2).await.unwrap(), Offset::new(2));
}

#[tokio::test]
async fn test_cluster_send_surfaces_store_outage() {
    let cluster = SimulatedCluster::new(TWO_NODE, 13);
    cluster.store().fault_config().force_cas_fail = true;

    let err = cluster.send(0, "k", 1).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TemporarilyUnavailable);
    assert!(!err.fatal);

    // Nothing was allocated, so the next send still gets the first offset.
    assert_eq!(cluster.send(0, "k", 2).await.unwrap(), Offset::FIRST);
}

// ============================================================================
// Poll
// ============================================================================

#[tokio::test]
async fn test_cluster_poll_never_returns_below_minimum() {
    let cluster = SimulatedCluster::new(TWO_NODE, 21);
    for value in 0..6 {
        cluster.send(value as usize % TWO_NODE, "k", value).await.unwrap();
    }

    for min in 1..=7 {
        let msgs = cluster.poll(0, &[("k", min)]).await.unwrap();
        let got = msgs.get(&LogKey::new("k")).cloned().unwrap_or_default();
        assert!(got.iter().all(|e| e.offset.get() >= min));
        assert_eq!(got.len(), (7 - min) as usize);
    }
}

#[tokio::test]
async fn test_cluster_repeated_merges_stay_sorted_and_unique() {
    let cluster = SimulatedCluster::new(THREE_NODE, 22);
    for value in 0..12 {
        cluster.send(value as usize % THREE_NODE, "k", value).await.unwrap();
    }

    let mut previous = None;
    for round in 0..5 {
        let msgs = cluster.poll(round % THREE_NODE, &[("k", 1)]).await.unwrap();
        let got = &msgs[&LogKey::new("k")];
        assert!(got.windows(2).all(|w| w[0].offset < w[1].offset));
        assert_eq!(got.len(), 12);
        if let Some(previous) = &previous {
            assert_eq!(previous, got);
        }
        previous = Some(got.clone());
    }
}

#[tokio::test]
async fn test_cluster_poll_omits_unknown_keys() {
    let cluster = SimulatedCluster::new(TWO_NODE, 23);
    cluster.send(1, "known", 5).await.unwrap();

    let msgs = cluster.poll(0, &[("known", 1), ("unknown", 1)]).await.unwrap();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[&LogKey::new("known")], entries(&[(1, 5)]));
}

#[tokio::test]
async fn test_cluster_peer_poll_does_not_fan_out() {
    let cluster = SimulatedCluster::new(THREE_NODE, 24);
    cluster.send(1, "k", 1).await.unwrap();

    cluster.poll(0, &[("k", 1)]).await.unwrap();

    // One peer poll to each other node; neither asked anyone else.
    assert_eq!(cluster.delivered(), 2);
}

#[tokio::test]
async fn test_cluster_partitioned_peer_does_not_block_poll() {
    let cluster = SimulatedCluster::new(THREE_NODE, 25);
    cluster.send(1, "k", 10).await.unwrap();
    cluster.send(2, "k", 20).await.unwrap();

    cluster.isolate(2);
    let msgs = cluster.poll(0, &[("k", 1)]).await.unwrap();
    assert_eq!(msgs[&LogKey::new("k")], entries(&[(1, 10)]));
    assert_eq!(cluster.dropped(), 1);

    cluster.heal();
    let msgs = cluster.poll(0, &[("k", 1)]).await.unwrap();
    assert_eq!(msgs[&LogKey::new("k")], entries(&[(1, 10), (2, 20)]));
}

#[tokio::test]
async fn test_cluster_learned_entries_survive_partition() {
    let cluster = SimulatedCluster::new(TWO_NODE, 26);
    cluster.send(1, "k", 3).await.unwrap();

    // n0 learns the entry, then loses n1.
    cluster.poll(0, &[("k", 1)]).await.unwrap();
    cluster.isolate(1);

    let msgs = cluster.poll(0, &[("k", 1)]).await.unwrap();
    assert_eq!(msgs[&LogKey::new("k")], entries(&[(1, 3)]));
}

// ============================================================================
// Commit Tracking
// ============================================================================

#[tokio::test]
async fn test_cluster_commit_is_monotonic() {
    let cluster = SimulatedCluster::new(TWO_NODE, 31);
    for value in 0..5 {
        cluster.send(0, "k", value).await.unwrap();
    }

    cluster.commit(0, &[("k", 5)]).await.unwrap();
    cluster.commit(1, &[("k", 3)]).await.unwrap();

    for node in 0..TWO_NODE {
        let offsets = cluster.list(node, &["k"]).await.unwrap();
        assert_eq!(offsets[&LogKey::new("k")], Offset::new(5));
    }
}

#[tokio::test]
async fn test_cluster_repeated_commit_is_idempotent() {
    let cluster = SimulatedCluster::new(TWO_NODE, 32);
    for value in 0..5 {
        cluster.send(1, "k", value).await.unwrap();
    }

    for node in [0, 1, 0] {
        cluster.commit(node, &[("k", 5)]).await.unwrap();
    }
    assert_eq!(cluster.store().peek("offset/committed/k"), Some(5));
}

#[tokio::test]
async fn test_cluster_list_omits_uncommitted_keys() {
    let cluster = SimulatedCluster::new(TWO_NODE, 33);
    cluster.send(0, "a", 1).await.unwrap();
    cluster.send(0, "b", 1).await.unwrap();
    cluster.commit(1, &[("a", 1)]).await.unwrap();

    let offsets = cluster.list(0, &["a", "b", "c"]).await.unwrap();
    assert_eq!(offsets.len(), 1);
    assert_eq!(offsets[&LogKey::new("a")], Offset::new(1));
}

#[tokio::test]
async fn test_cluster_commit_beyond_allocation_is_malformed() {
    let cluster = SimulatedCluster::new(SINGLE_NODE, 34);
    cluster.send(0, "k", 1).await.unwrap();

    let err = cluster.commit(0, &[("k", 4)]).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::MalformedRequest);
    assert!(!err.fatal);
    assert!(cluster.list(0, &["k"]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cluster_invariant_violation_is_fatal() {
    let cluster = SimulatedCluster::new(TWO_NODE, 35);
    cluster.store().poke("offset/prev/k", 2);
    cluster.store().poke("offset/committed/k", 9);

    let err = cluster.list(1, &["k"]).await.unwrap_err();
    assert!(err.fatal);
    assert_eq!(err.code, ErrorCode::Crash);
}

// ============================================================================
// Request Validation
// ============================================================================

#[tokio::test]
async fn test_cluster_rejects_unsupported_request() {
    let cluster = SimulatedCluster::new(SINGLE_NODE, 41);
    let err = cluster
        .request("c0", 0, Payload::Read { key: "x".into() })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotSupported);
}

#[tokio::test]
async fn test_cluster_rejects_empty_key() {
    let cluster = SimulatedCluster::new(SINGLE_NODE, 42);
    let err = cluster.send(0, "", 1).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::MalformedRequest);
}
