//! Log service DST tests.
//!
//! Seeded random workloads of concurrent clients against a simulated cluster
//! whose coordination store injects faults. Every acknowledged operation is
//! recorded and checked against the client-visible guarantees:
//! - acknowledged offsets are unique and gap-free per key
//! - polls are ascending, respect their minimum and return sent values
//! - listed watermarks never fall below an acknowledged commit
//! - after the workload, every node can serve every acknowledged entry

// Test-specific lint allowances.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]

use std::collections::BTreeMap;

use futures::future::join_all;
use quill_coord::SimulatedCoordStore;
use quill_core::{LogEntry, LogKey, Offset};
use quill_runtime::HandlerError;
use quill_server::ServiceConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::properties::PropertyChecker;
use crate::scenarios::clusters::{THREE_NODE, TWO_NODE};
use crate::scenarios::faults::{contended_store, flaky_store};
use crate::scenarios::seeds::REGRESSION_SEEDS;
use crate::scenarios::workloads::{CLIENTS, KEYS, SENDS_PER_CLIENT};
use crate::simulated_cluster::SimulatedCluster;

/// One planned client operation.
#[derive(Debug, Clone)]
enum Op {
    Send { node: usize, key: &'static str, value: i64 },
    Poll { node: usize, key: &'static str, min: u64 },
    Commit { node: usize, key: &'static str, offset: u64 },
    List { node: usize },
}

/// What an operation returned.
#[derive(Debug)]
enum Outcome {
    Sent(&'static str, i64, Result<Offset, HandlerError>),
    Polled(&'static str, u64, Result<BTreeMap<LogKey, Vec<LogEntry>>, HandlerError>),
    Committed(&'static str, u64, Result<(), HandlerError>),
    Listed(Result<BTreeMap<LogKey, Offset>, HandlerError>),
}

async fn execute(cluster: &SimulatedCluster, op: Op) -> Outcome {
    match op {
        Op::Send { node, key, value } => Outcome::Sent(key, value, cluster.send(node, key, value).await),
        Op::Poll { node, key, min } => Outcome::Polled(key, min, cluster.poll(node, &[(key, min)]).await),
        Op::Commit { node, key, offset } => {
            Outcome::Committed(key, offset, cluster.commit(node, &[(key, offset)]).await)
        }
        Op::List { node } => Outcome::Listed(cluster.list(node, KEYS).await),
    }
}

/// Plans one round of concurrent operations.
fn plan_round(
    rng: &mut StdRng,
    node_count: usize,
    acked: &BTreeMap<&'static str, u64>,
    next_value: &mut i64,
) -> Vec<Op> {
    let mut ops = Vec::new();
    for _ in 0..CLIENTS * SENDS_PER_CLIENT {
        let node = rng.gen_range(0..node_count);
        let key = KEYS[rng.gen_range(0..KEYS.len())];
        let max = acked.get(key).copied().unwrap_or(0);
        let op = match rng.gen_range(0..10) {
            0..=4 => {
                *next_value += 1;
                Op::Send {
                    node,
                    key,
                    value: *next_value,
                }
            }
            5..=6 => Op::Poll {
                node,
                key,
                min: rng.gen_range(1..=max + 1),
            },
            7..=8 if max > 0 => Op::Commit {
                node,
                key,
                offset: rng.gen_range(1..=max),
            },
            _ => Op::List { node },
        };
        ops.push(op);
    }
    ops
}

/// Runs a seeded workload and returns the checker holding its history.
async fn run_workload(cluster: &SimulatedCluster, seed: u64, rounds: usize) -> PropertyChecker {
    let node_count = cluster.node_ids().len();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut checker = PropertyChecker::new();
    let mut acked: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut next_value: i64 = 0;

    for _ in 0..rounds {
        let ops = plan_round(&mut rng, node_count, &acked, &mut next_value);

        // A list may observe a commit before its reply arrives.
        for op in &ops {
            if let Op::Commit { key, offset, .. } = op {
                checker.record_commit_attempt(&LogKey::new(*key), Offset::new(*offset));
            }
        }

        let outcomes = join_all(ops.into_iter().map(|op| execute(cluster, op))).await;

        // Commits are recorded last: lists in the same round ran concurrently
        // with them and may legitimately miss them.
        let mut commits = Vec::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Sent(key, value, Ok(offset)) => {
                    checker.record_send(&LogKey::new(key), value, offset);
                    let max = acked.entry(key).or_insert(0);
                    *max = (*max).max(offset.get());
                }
                Outcome::Polled(key, min, Ok(msgs)) => {
                    let key = LogKey::new(key);
                    let got = msgs.get(&key).map_or(&[][..], Vec::as_slice);
                    checker.record_poll(&key, Offset::new(min), got);
                }
                Outcome::Listed(Ok(offsets)) => {
                    let keys: Vec<LogKey> = KEYS.iter().map(|k| LogKey::new(*k)).collect();
                    checker.record_list(&keys, &offsets);
                }
                Outcome::Committed(key, offset, Ok(())) => commits.push((key, offset)),
                Outcome::Sent(.., Err(e))
                | Outcome::Polled(.., Err(e))
                | Outcome::Committed(.., Err(e))
                | Outcome::Listed(Err(e)) => {
                    assert!(!e.fatal, "seed {seed}: unexpected fatal error: {}", e.text);
                }
            }
        }
        for (key, offset) in commits {
            checker.record_commit(&LogKey::new(key), Offset::new(offset));
        }
    }

    checker
}

/// Asserts every node serves every acknowledged entry of every key.
async fn assert_converged(cluster: &SimulatedCluster, checker: &mut PropertyChecker, seed: u64) {
    for node in 0..cluster.node_ids().len() {
        for &key in KEYS {
            let msgs = cluster
                .poll(node, &[(key, 1)])
                .await
                .unwrap_or_else(|e| panic!("seed {seed}: final poll failed: {}", e.text));
            let log_key = LogKey::new(key);
            let got = msgs.get(&log_key).map_or(&[][..], Vec::as_slice);
            checker.record_poll(&log_key, Offset::FIRST, got);

            let max = got.last().map_or(0, |e| e.offset.get());
            assert_eq!(
                got.len() as u64,
                max,
                "seed {seed}: node {node} is missing entries of {key}"
            );
        }
    }
}

#[tokio::test]
async fn test_dst_service_fault_free() {
    for &seed in REGRESSION_SEEDS {
        let cluster = SimulatedCluster::new(THREE_NODE, seed);
        let mut checker = run_workload(&cluster, seed, 3).await;
        assert_converged(&cluster, &mut checker, seed).await;
        checker.assert_clean();
        assert!(checker.send_count() > 0, "seed {seed}: no sends acknowledged");
    }
}

#[tokio::test]
async fn test_dst_service_flaky_store() {
    for &seed in REGRESSION_SEEDS {
        let store = SimulatedCoordStore::with_faults(seed, flaky_store());
        let cluster = SimulatedCluster::with_config(THREE_NODE, store, ServiceConfig::fast_for_testing());
        let mut checker = run_workload(&cluster, seed, 3).await;

        // Heal the store so the final convergence polls cannot fail.
        *cluster.store().fault_config() = quill_coord::CoordFaultConfig::none();
        assert_converged(&cluster, &mut checker, seed).await;
        checker.assert_clean();
    }
}

#[tokio::test]
async fn test_dst_service_contended_store() {
    for &seed in REGRESSION_SEEDS.iter().take(4) {
        let store = SimulatedCoordStore::with_faults(seed, contended_store(50));
        let cluster = SimulatedCluster::with_config(TWO_NODE, store, ServiceConfig::fast_for_testing());
        let mut checker = run_workload(&cluster, seed, 2).await;
        assert_converged(&cluster, &mut checker, seed).await;
        checker.assert_clean();
    }
}

#[tokio::test]
async fn test_dst_service_partitioned_minority() {
    for &seed in REGRESSION_SEEDS.iter().take(4) {
        let cluster = SimulatedCluster::new(THREE_NODE, seed);
        cluster.isolate(2);
        let mut checker = run_workload(&cluster, seed, 2).await;

        cluster.heal();
        assert_converged(&cluster, &mut checker, seed).await;
        checker.assert_clean();
        assert!(cluster.dropped() > 0, "seed {seed}: partition never hit");
    }
}
