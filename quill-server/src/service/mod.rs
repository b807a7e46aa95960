//! Quill log service implementation.
//!
//! One [`LogService`] runs per node. It owns the node's in-memory logs and
//! talks to the shared coordination store for everything that must be agreed
//! cluster-wide: offsets and commit watermarks.
//!
//! Requests arrive through the runtime's [`Handler`] seam; each runs on its
//! own task, so the service is shared immutably and all mutation goes through
//! the log store's mutex or the coordination store's CAS.

/// Handler implementations for the log service.
pub mod handlers;
mod reconcile;

use std::sync::Arc;

use async_trait::async_trait;
use quill_coord::CoordStore;
use quill_core::NodeId;
use quill_log::{CommitTracker, LogStore, OffsetAllocator};
use quill_runtime::{Handler, HandlerError, Payload, Transport};
use tracing::{debug, info};

use crate::config::ServiceConfig;

/// Per-node state of the commit-log service.
pub struct LogService<S: CoordStore, T: Transport> {
    /// Entries this node appended or learned from peers.
    pub(crate) logs: LogStore,
    /// Cluster-wide offset allocation.
    pub(crate) allocator: OffsetAllocator<S>,
    /// Cluster-wide commit watermarks.
    pub(crate) tracker: CommitTracker<S>,
    /// Peer RPC.
    pub(crate) transport: T,
    /// Service configuration.
    pub(crate) config: ServiceConfig,
}

impl<S: CoordStore, T: Transport> LogService<S, T> {
    /// Creates the service for one node.
    #[must_use]
    pub fn new(coord: Arc<S>, transport: T, config: ServiceConfig) -> Self {
        info!(
            node_id = %transport.node_id(),
            peers = transport.peers().len(),
            peer_timeout = ?config.peer_timeout,
            max_cas_attempts = ?config.retry.max_attempts,
            "Starting log service"
        );
        Self {
            logs: LogStore::new(),
            allocator: OffsetAllocator::new(Arc::clone(&coord), config.retry),
            tracker: CommitTracker::new(coord, config.retry),
            transport,
            config,
        }
    }

    /// Returns this node's id.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        self.transport.node_id()
    }

    /// Returns the node's local log store.
    #[must_use]
    pub const fn logs(&self) -> &LogStore {
        &self.logs
    }

    /// Returns the service configuration.
    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

#[async_trait]
impl<S, T> Handler for LogService<S, T>
where
    S: CoordStore + 'static,
    T: Transport,
{
    async fn handle(&self, src: NodeId, payload: Payload) -> Result<Payload, HandlerError> {
        let kind = payload.kind();
        debug!(node_id = %self.node_id(), src = %src, kind, "Handling request");

        let result = match payload {
            Payload::Send { key, msg } => self
                .send_internal(key, msg)
                .await
                .map(|offset| Payload::SendOk { offset }),
            Payload::Poll { offsets } => self
                .poll_internal(&src, offsets)
                .await
                .map(|msgs| Payload::PollOk { msgs }),
            Payload::CommitOffsets { offsets } => self
                .commit_offsets_internal(offsets)
                .await
                .map(|()| Payload::CommitOffsetsOk),
            Payload::ListCommittedOffsets { keys } => self
                .list_committed_offsets_internal(keys)
                .await
                .map(|offsets| Payload::ListCommittedOffsetsOk { offsets }),
            other => return Err(HandlerError::not_supported(other.kind())),
        };

        result.map_err(|e| e.to_handler_error())
    }
}
