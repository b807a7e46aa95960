//! Produce handler for the log service.

use quill_coord::CoordStore;
use quill_core::{LogEntry, LogKey, Offset};
use quill_runtime::Transport;
use tracing::{debug, warn};

use crate::error::ServerResult;
use crate::service::LogService;

impl<S: CoordStore, T: Transport> LogService<S, T> {
    /// Appends `msg` to log `key` and returns its offset.
    ///
    /// The entry is in the local store before the offset is returned, so a
    /// `send_ok` is never followed by a poll on this node that misses it.
    pub(crate) async fn send_internal(&self, key: LogKey, msg: i64) -> ServerResult<Offset> {
        self.config.limits.check_key(&key)?;

        let offset = self.allocator.allocate(&key).await?;
        if !self.logs.append(&key, LogEntry::new(offset, msg)) {
            // Only the allocating node writes an offset first.
            warn!(key = %key, offset = offset.get(), "Freshly allocated offset already present");
        }

        debug!(key = %key, offset = offset.get(), msg, "Appended entry");
        Ok(offset)
    }
}
