//! Committed offset handlers for the log service.

use std::collections::BTreeMap;

use quill_coord::CoordStore;
use quill_core::{LogKey, Offset};
use quill_log::CommitOutcome;
use quill_runtime::Transport;
use tracing::debug;

use crate::error::ServerResult;
use crate::service::LogService;

impl<S: CoordStore, T: Transport> LogService<S, T> {
    /// Advances the commit watermark of every listed log.
    ///
    /// Stops at the first failing key; keys before it stay committed.
    pub(crate) async fn commit_offsets_internal(
        &self,
        offsets: BTreeMap<LogKey, Offset>,
    ) -> ServerResult<()> {
        self.config.limits.check_keys(offsets.keys())?;

        for (key, offset) in &offsets {
            match self.tracker.commit(key, *offset).await? {
                CommitOutcome::Advanced { from, to } => {
                    debug!(key = %key, from = from.get(), to = to.get(), "Commit advanced");
                }
                CommitOutcome::Unchanged { current } => {
                    debug!(
                        key = %key,
                        offset = offset.get(),
                        current = current.get(),
                        "Commit already covered"
                    );
                }
            }
        }
        Ok(())
    }

    /// Returns the watermarks of the listed logs that were ever committed.
    pub(crate) async fn list_committed_offsets_internal(
        &self,
        keys: Vec<LogKey>,
    ) -> ServerResult<BTreeMap<LogKey, Offset>> {
        self.config.limits.check_keys(&keys)?;
        Ok(self.tracker.list_committed(&keys).await?)
    }
}
