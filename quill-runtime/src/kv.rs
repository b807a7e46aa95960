//! Coordination store client over the node transport.
//!
//! [`LinKvStore`] speaks the `read`/`write`/`cas` RPCs of a linearizable
//! key-value service and maps its error codes onto [`CoordError`].

use std::time::Duration;

use async_trait::async_trait;
use quill_coord::{CoordError, CoordResult, CoordStore};
use quill_core::NodeId;
use tracing::trace;

use crate::error::RuntimeError;
use crate::message::{ErrorCode, Payload};
use crate::transport::Transport;

/// A [`CoordStore`] backed by a key-value service reached through `T`.
pub struct LinKvStore<T: Transport> {
    transport: T,
    service: NodeId,
    timeout: Duration,
}

impl<T: Transport> LinKvStore<T> {
    /// Creates a client for `service`, bounding each RPC by `timeout`.
    #[must_use]
    pub const fn new(transport: T, service: NodeId, timeout: Duration) -> Self {
        Self {
            transport,
            service,
            timeout,
        }
    }

    /// Returns the service this client talks to.
    #[must_use]
    pub const fn service(&self) -> &NodeId {
        &self.service
    }

    async fn rpc(&self, operation: &'static str, payload: Payload) -> Result<Payload, RuntimeError> {
        trace!(service = %self.service, operation, "Coordination rpc");
        self.transport
            .call(&self.service, payload, self.timeout)
            .await
    }
}

/// Maps a transport failure that carries no key-specific meaning.
fn transport_error(operation: &'static str, err: RuntimeError) -> CoordError {
    match err {
        RuntimeError::Timeout { waited_ms, .. } => CoordError::Timeout {
            operation,
            waited_ms,
        },
        RuntimeError::Remote {
            code: ErrorCode::Timeout,
            ..
        } => CoordError::Timeout {
            operation,
            waited_ms: 0,
        },
        other => CoordError::Unavailable {
            operation,
            message: other.to_string(),
        },
    }
}

fn unexpected(operation: &'static str, reply: &Payload) -> CoordError {
    CoordError::Unavailable {
        operation,
        message: format!("unexpected reply {}", reply.kind()),
    }
}

#[async_trait]
impl<T: Transport> CoordStore for LinKvStore<T> {
    async fn read(&self, key: &str) -> CoordResult<Option<u64>> {
        let payload = Payload::Read {
            key: key.to_string(),
        };
        match self.rpc("read", payload).await {
            Ok(Payload::ReadOk { value }) => Ok(Some(value)),
            Ok(other) => Err(unexpected("read", &other)),
            Err(RuntimeError::Remote {
                code: ErrorCode::KeyDoesNotExist,
                ..
            }) => Ok(None),
            Err(e) => Err(transport_error("read", e)),
        }
    }

    async fn write(&self, key: &str, value: u64) -> CoordResult<()> {
        let payload = Payload::Write {
            key: key.to_string(),
            value,
        };
        match self.rpc("write", payload).await {
            Ok(Payload::WriteOk) => Ok(()),
            Ok(other) => Err(unexpected("write", &other)),
            Err(e) => Err(transport_error("write", e)),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: u64,
        new: u64,
        create_if_missing: bool,
    ) -> CoordResult<()> {
        let payload = Payload::Cas {
            key: key.to_string(),
            from: expected,
            to: new,
            create_if_not_exists: create_if_missing,
        };
        match self.rpc("cas", payload).await {
            Ok(Payload::CasOk) => Ok(()),
            Ok(other) => Err(unexpected("cas", &other)),
            Err(RuntimeError::Remote {
                code: ErrorCode::KeyDoesNotExist,
                ..
            }) => Err(CoordError::KeyAbsent {
                key: key.to_string(),
            }),
            Err(RuntimeError::Remote {
                code: ErrorCode::PreconditionFailed,
                ..
            }) => Err(CoordError::PreconditionFailed {
                key: key.to_string(),
                expected,
                actual: None,
            }),
            Err(e) => Err(transport_error("cas", e)),
        }
    }
}
