//! Transport and handler trait abstractions.
//!
//! This module defines the two seams between the runtime and the service it
//! hosts, allowing different implementations for production (stdin/stdout
//! JSON lines) and simulation (in-process cluster).
//!
//! - [`Transport`]: what a service needs from the runtime (identity, topology,
//!   request/reply RPC).
//! - [`Handler`]: what the runtime needs from a service (turn a request
//!   payload into a reply payload).

use std::time::Duration;

use async_trait::async_trait;
use quill_core::NodeId;

use crate::error::RuntimeResult;
use crate::message::{ErrorCode, Payload};

/// Trait for outbound communication from one node.
///
/// Implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Returns this node's id.
    fn node_id(&self) -> &NodeId;

    /// Returns every other server node in the cluster.
    fn peers(&self) -> Vec<NodeId>;

    /// Sends `payload` to `dest` and waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if no reply arrives within `timeout`, `Remote` if the
    /// reply is an `error` body, or `Closed` if the runtime is shutting down.
    async fn call(&self, dest: &NodeId, payload: Payload, timeout: Duration)
        -> RuntimeResult<Payload>;

    /// Returns true if `node` is a server node of this cluster.
    fn is_cluster_node(&self, node: &NodeId) -> bool {
        node == self.node_id() || self.peers().contains(node)
    }
}

/// Trait for services hosted by the runtime.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handles one request from `src` and returns the reply payload.
    ///
    /// # Errors
    ///
    /// Returns a `HandlerError` that the runtime sends back as an `error`
    /// body. Fatal errors also stop the runtime.
    async fn handle(&self, src: NodeId, payload: Payload) -> Result<Payload, HandlerError>;
}

/// An error a handler reports for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    /// Code sent to the requester.
    pub code: ErrorCode,
    /// Description sent to the requester.
    pub text: String,
    /// Whether the node must stop serving.
    pub fatal: bool,
}

impl HandlerError {
    /// Creates a recoverable error.
    #[must_use]
    pub fn new(code: ErrorCode, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
            fatal: false,
        }
    }

    /// Creates an error that stops the node.
    #[must_use]
    pub fn fatal(text: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Crash,
            text: text.into(),
            fatal: true,
        }
    }

    /// Creates a `not-supported` error for a request type.
    #[must_use]
    pub fn not_supported(kind: &str) -> Self {
        Self::new(ErrorCode::NotSupported, format!("unsupported request type: {kind}"))
    }

    /// Converts the error to an `error` payload.
    #[must_use]
    pub fn to_payload(&self) -> Payload {
        Payload::error(self.code, self.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_payload() {
        let err = HandlerError::new(ErrorCode::TemporarilyUnavailable, "store down");
        assert!(!err.fatal);
        assert_eq!(
            err.to_payload(),
            Payload::Error {
                code: ErrorCode::TemporarilyUnavailable,
                text: "store down".into()
            }
        );
    }

    #[test]
    fn test_fatal_uses_crash_code() {
        let err = HandlerError::fatal("corrupt");
        assert!(err.fatal);
        assert_eq!(err.code, ErrorCode::Crash);
    }

    #[test]
    fn test_not_supported_mentions_type() {
        let err = HandlerError::not_supported("echo");
        assert_eq!(err.code, ErrorCode::NotSupported);
        assert!(err.text.contains("echo"));
    }
}
