//! Runtime error types.

use quill_core::NodeId;
use thiserror::Error;

use crate::message::ErrorCode;

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised by the node runtime and its RPC layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// An inbound line could not be decoded.
    #[error("failed to decode message ({code}): {message}")]
    Decode {
        /// Sender, if the envelope could be read.
        src: Option<NodeId>,
        /// Request id, if one could be read.
        msg_id: Option<u64>,
        /// Id of the request this line answers, if one could be read.
        in_reply_to: Option<u64>,
        /// Code to answer the sender with.
        code: ErrorCode,
        /// Decoder error.
        message: String,
    },

    /// An outbound message could not be encoded.
    #[error("failed to encode message: {message}")]
    Encode {
        /// Encoder error.
        message: String,
    },

    /// The remote side answered with an `error` body.
    #[error("{dest} replied with error {code}: {text}")]
    Remote {
        /// Who answered.
        dest: NodeId,
        /// Error code.
        code: ErrorCode,
        /// Error text.
        text: String,
    },

    /// No reply arrived before the deadline.
    #[error("rpc {kind} to {dest} timed out after {waited_ms}ms")]
    Timeout {
        /// Who we asked.
        dest: NodeId,
        /// Request type.
        kind: &'static str,
        /// How long we waited (in milliseconds).
        waited_ms: u64,
    },

    /// The reply was of an unexpected type.
    #[error("unexpected reply from {dest}: expected {expected}, got {actual}")]
    UnexpectedReply {
        /// Who answered.
        dest: NodeId,
        /// The reply type we wanted.
        expected: &'static str,
        /// The reply type we got.
        actual: &'static str,
    },

    /// The destination is not a known peer.
    #[error("unknown node: {node}")]
    UnknownNode {
        /// The unknown node.
        node: NodeId,
    },

    /// The runtime is shutting down and cannot send.
    #[error("runtime closed")]
    Closed,

    /// The first message was not `init`, or `init` was invalid.
    #[error("handshake failed: {message}")]
    Handshake {
        /// What went wrong.
        message: String,
    },

    /// Reading input or writing output failed.
    #[error("I/O error during {operation}: {message}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// Error message.
        message: String,
    },

    /// A handler reported an unrecoverable error; the node stopped.
    #[error("fatal handler error: {message}")]
    Fatal {
        /// Error message.
        message: String,
    },
}

impl RuntimeError {
    /// Wraps a `std::io::Error`.
    #[must_use]
    pub fn io(operation: &'static str, err: &std::io::Error) -> Self {
        Self::Io {
            operation,
            message: err.to_string(),
        }
    }
}
