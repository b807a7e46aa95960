//! Consume handler for the log service.

use std::collections::BTreeMap;

use quill_coord::CoordStore;
use quill_core::{LogKey, NodeId, Offset};
use quill_runtime::Transport;
use tracing::{debug, trace};

use crate::error::ServerResult;
use crate::service::reconcile::{merge_results, PollResult};
use crate::service::LogService;

impl<S: CoordStore, T: Transport> LogService<S, T> {
    /// Returns entries at or after each requested offset.
    ///
    /// A poll from a client is reconciled with every peer and the merged
    /// result is kept locally. A poll from another server node is answered
    /// from local entries only, so peer polls never fan out again.
    pub(crate) async fn poll_internal(
        &self,
        src: &NodeId,
        offsets: BTreeMap<LogKey, Offset>,
    ) -> ServerResult<PollResult> {
        self.config.limits.check_keys(offsets.keys())?;

        let local = self.local_poll(&offsets);
        if self.transport.is_cluster_node(src) {
            trace!(src = %src, keys = offsets.len(), "Answering peer poll locally");
            return Ok(local);
        }

        let remote = self.gather_from_peers(src, &offsets).await;
        let merged = merge_results(&offsets, local, remote);

        for (key, entries) in &merged {
            let learned = self.logs.merge(key, entries.iter().copied());
            if learned > 0 {
                debug!(key = %key, learned, "Learned entries from peers");
            }
        }
        Ok(merged)
    }

    fn local_poll(&self, offsets: &BTreeMap<LogKey, Offset>) -> PollResult {
        offsets
            .iter()
            .filter_map(|(key, min_offset)| {
                let entries = self.logs.range(key, *min_offset);
                (!entries.is_empty()).then(|| (key.clone(), entries))
            })
            .collect()
    }
}
