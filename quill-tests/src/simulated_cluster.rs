//! In-process cluster for multi-node testing.
//!
//! Every node is a real [`LogService`]; only the network is simulated. A
//! [`ClusterTransport`] delivers an RPC by invoking the destination node's
//! handler directly, and all nodes share one [`SimulatedCoordStore`] standing
//! in for the `lin-kv` service.
//!
//! # Partitions
//!
//! Links are blocked per direction. An RPC over a blocked link is never
//! delivered, so the caller sees its own timeout expire, exactly as with a
//! dropped message on a real network.

#![allow(clippy::significant_drop_tightening)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use quill_coord::SimulatedCoordStore;
use quill_core::{LogEntry, LogKey, NodeId, Offset};
use quill_runtime::{Handler, HandlerError, Payload, RuntimeError, RuntimeResult, Transport};
use quill_server::{LogService, ServiceConfig};
use tracing::trace;

/// A log service wired to the simulated network.
pub type SimNode = LogService<SimulatedCoordStore, ClusterTransport>;

// ============================================================================
// Network State
// ============================================================================

/// Shared view of which nodes exist and which links are up.
#[derive(Default)]
pub struct NetworkState {
    /// Registered handlers by node id.
    handlers: Mutex<BTreeMap<NodeId, Weak<dyn Handler>>>,
    /// Blocked directed links: (from, to).
    blocked: Mutex<BTreeSet<(NodeId, NodeId)>>,
    /// RPCs delivered to a handler.
    delivered: AtomicU64,
    /// RPCs dropped by a partition.
    dropped: AtomicU64,
}

impl NetworkState {
    fn is_blocked(&self, from: &NodeId, to: &NodeId) -> bool {
        self.blocked
            .lock()
            .expect("blocked lock poisoned")
            .contains(&(from.clone(), to.clone()))
    }

    fn handler(&self, node: &NodeId) -> Option<Arc<dyn Handler>> {
        self.handlers
            .lock()
            .expect("handlers lock poisoned")
            .get(node)
            .and_then(Weak::upgrade)
    }
}

// ============================================================================
// Cluster Transport
// ============================================================================

/// [`Transport`] that delivers RPCs in-process over a [`NetworkState`].
pub struct ClusterTransport {
    node_id: NodeId,
    members: Vec<NodeId>,
    network: Arc<NetworkState>,
}

#[async_trait]
impl Transport for ClusterTransport {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn peers(&self) -> Vec<NodeId> {
        self.members
            .iter()
            .filter(|id| **id != self.node_id)
            .cloned()
            .collect()
    }

    async fn call(
        &self,
        dest: &NodeId,
        payload: Payload,
        timeout: Duration,
    ) -> RuntimeResult<Payload> {
        let kind = payload.kind();
        let Some(handler) = self.network.handler(dest) else {
            return Err(RuntimeError::UnknownNode { node: dest.clone() });
        };

        let lost = self.network.is_blocked(&self.node_id, dest)
            || self.network.is_blocked(dest, &self.node_id);
        let network = Arc::clone(&self.network);
        let src = self.node_id.clone();
        let delivery = async move {
            if lost {
                network.dropped.fetch_add(1, Ordering::Relaxed);
                std::future::pending::<()>().await;
            }
            network.delivered.fetch_add(1, Ordering::Relaxed);
            handler.handle(src, payload).await
        };

        match tokio::time::timeout(timeout, delivery).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(RuntimeError::Remote {
                dest: dest.clone(),
                code: e.code,
                text: e.text,
            }),
            Err(_) => {
                trace!(src = %self.node_id, dest = %dest, kind, "Simulated rpc timed out");
                #[allow(clippy::cast_possible_truncation)]
                let waited_ms = timeout.as_millis() as u64;
                Err(RuntimeError::Timeout {
                    dest: dest.clone(),
                    kind,
                    waited_ms,
                })
            }
        }
    }
}

// ============================================================================
// Simulated Cluster
// ============================================================================

/// A set of log service nodes sharing a coordination store and a network.
pub struct SimulatedCluster {
    store: SimulatedCoordStore,
    network: Arc<NetworkState>,
    nodes: BTreeMap<NodeId, Arc<SimNode>>,
}

impl SimulatedCluster {
    /// Creates `node_count` nodes named `n0`, `n1`, ... over a fault-free
    /// store seeded with `seed`.
    ///
    /// # Panics
    ///
    /// Panics if `node_count` is zero.
    #[must_use]
    pub fn new(node_count: usize, seed: u64) -> Self {
        Self::with_config(
            node_count,
            SimulatedCoordStore::new(seed),
            ServiceConfig::fast_for_testing(),
        )
    }

    /// Creates `node_count` nodes over `store` with `config`.
    ///
    /// # Panics
    ///
    /// Panics if `node_count` is zero.
    #[must_use]
    pub fn with_config(node_count: usize, store: SimulatedCoordStore, config: ServiceConfig) -> Self {
        assert!(node_count > 0, "cluster needs at least one node");

        let members: Vec<NodeId> = (0..node_count).map(|i| NodeId::new(format!("n{i}"))).collect();
        let network = Arc::new(NetworkState::default());

        let mut nodes = BTreeMap::new();
        for id in &members {
            let transport = ClusterTransport {
                node_id: id.clone(),
                members: members.clone(),
                network: Arc::clone(&network),
            };
            let node = Arc::new(LogService::new(
                Arc::new(store.clone()),
                transport,
                config.clone(),
            ));
            let weak: Weak<dyn Handler> = Arc::downgrade(&node) as Weak<dyn Handler>;
            network
                .handlers
                .lock()
                .expect("handlers lock poisoned")
                .insert(id.clone(), weak);
            nodes.insert(id.clone(), node);
        }

        Self {
            store,
            network,
            nodes,
        }
    }

    /// Returns the shared coordination store.
    #[must_use]
    pub const fn store(&self) -> &SimulatedCoordStore {
        &self.store
    }

    /// Returns every node id, in order.
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    /// Returns node number `index`.
    ///
    /// # Panics
    ///
    /// Panics if there is no such node.
    #[must_use]
    pub fn node(&self, index: usize) -> &Arc<SimNode> {
        self.nodes
            .get(&NodeId::new(format!("n{index}")))
            .expect("no such node")
    }

    /// Returns how many RPCs reached a handler.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.network.delivered.load(Ordering::Relaxed)
    }

    /// Returns how many RPCs a partition swallowed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.network.dropped.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------------
    // Fault Injection
    // ------------------------------------------------------------------------

    /// Cuts the link between nodes `a` and `b` in both directions.
    pub fn partition(&self, a: usize, b: usize) {
        let (a, b) = (Self::id(a), Self::id(b));
        let mut blocked = self.network.blocked.lock().expect("blocked lock poisoned");
        blocked.insert((a.clone(), b.clone()));
        blocked.insert((b, a));
    }

    /// Cuts node `index` off from every other node.
    pub fn isolate(&self, index: usize) {
        for other in 0..self.nodes.len() {
            if other != index {
                self.partition(index, other);
            }
        }
    }

    /// Restores every link.
    pub fn heal(&self) {
        self.network
            .blocked
            .lock()
            .expect("blocked lock poisoned")
            .clear();
    }

    // ------------------------------------------------------------------------
    // Client Requests
    // ------------------------------------------------------------------------

    /// Sends a raw request from `client` to node `index`.
    ///
    /// # Errors
    ///
    /// Returns the node's error reply.
    pub async fn request(
        &self,
        client: &str,
        index: usize,
        payload: Payload,
    ) -> Result<Payload, HandlerError> {
        self.node(index).handle(NodeId::new(client), payload).await
    }

    /// `send` through node `index`.
    ///
    /// # Errors
    ///
    /// Returns the node's error reply.
    ///
    /// # Panics
    ///
    /// Panics on a reply of the wrong type.
    pub async fn send(&self, index: usize, key: &str, msg: i64) -> Result<Offset, HandlerError> {
        let payload = Payload::Send {
            key: LogKey::new(key),
            msg,
        };
        match self.request("c0", index, payload).await? {
            Payload::SendOk { offset } => Ok(offset),
            other => panic!("unexpected send reply: {other:?}"),
        }
    }

    /// `poll` through node `index`.
    ///
    /// # Errors
    ///
    /// Returns the node's error reply.
    ///
    /// # Panics
    ///
    /// Panics on a reply of the wrong type.
    pub async fn poll(
        &self,
        index: usize,
        offsets: &[(&str, u64)],
    ) -> Result<BTreeMap<LogKey, Vec<LogEntry>>, HandlerError> {
        let payload = Payload::Poll {
            offsets: Self::offsets(offsets),
        };
        match self.request("c0", index, payload).await? {
            Payload::PollOk { msgs } => Ok(msgs),
            other => panic!("unexpected poll reply: {other:?}"),
        }
    }

    /// `commit_offsets` through node `index`.
    ///
    /// # Errors
    ///
    /// Returns the node's error reply.
    ///
    /// # Panics
    ///
    /// Panics on a reply of the wrong type.
    pub async fn commit(&self, index: usize, offsets: &[(&str, u64)]) -> Result<(), HandlerError> {
        let payload = Payload::CommitOffsets {
            offsets: Self::offsets(offsets),
        };
        match self.request("c0", index, payload).await? {
            Payload::CommitOffsetsOk => Ok(()),
            other => panic!("unexpected commit reply: {other:?}"),
        }
    }

    /// `list_committed_offsets` through node `index`.
    ///
    /// # Errors
    ///
    /// Returns the node's error reply.
    ///
    /// # Panics
    ///
    /// Panics on a reply of the wrong type.
    pub async fn list(
        &self,
        index: usize,
        keys: &[&str],
    ) -> Result<BTreeMap<LogKey, Offset>, HandlerError> {
        let payload = Payload::ListCommittedOffsets {
            keys: keys.iter().map(|k| LogKey::new(*k)).collect(),
        };
        match self.request("c0", index, payload).await? {
            Payload::ListCommittedOffsetsOk { offsets } => Ok(offsets),
            other => panic!("unexpected list reply: {other:?}"),
        }
    }

    fn id(index: usize) -> NodeId {
        NodeId::new(format!("n{index}"))
    }

    fn offsets(pairs: &[(&str, u64)]) -> BTreeMap<LogKey, Offset> {
        pairs
            .iter()
            .map(|(key, offset)| (LogKey::new(*key), Offset::new(*offset)))
            .collect()
    }
}
