//! Wire protocol: message envelope, typed bodies and error codes.
//!
//! Every message is one JSON object per line:
//!
//! ```text
//! {"src":"c1","dest":"n1","body":{"type":"send","msg_id":1,"key":"k","msg":10}}
//! ```
//!
//! Bodies are decoded into the tagged [`Payload`] enum at the boundary, so
//! nothing past this module handles loosely-typed JSON.

use std::collections::BTreeMap;
use std::fmt;

use quill_core::{LogEntry, LogKey, NodeId, Offset};
use serde::{Deserialize, Serialize};

use crate::error::{RuntimeError, RuntimeResult};

// -----------------------------------------------------------------------------
// Envelope
// -----------------------------------------------------------------------------

/// A message between two nodes (or a node and a client or service).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Sender.
    pub src: NodeId,
    /// Recipient.
    pub dest: NodeId,
    /// Typed body.
    pub body: Body,
}

/// Message body: correlation ids plus the typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Unique (per sender) id of a request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
    /// The `msg_id` of the request this body answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,
    /// The typed payload; its `type` tag is flattened into the body.
    #[serde(flatten)]
    pub payload: Payload,
}

impl Message {
    /// Decodes one line of input.
    ///
    /// Distinguishes an unknown `type` (`NotSupported`) from a known type with
    /// bad fields (`MalformedRequest`) so the sender gets a precise error.
    ///
    /// # Errors
    ///
    /// Returns `Decode` with the sender and request id recovered from the raw
    /// JSON where possible, so the runtime can still answer with an error.
    pub fn decode(line: &str) -> RuntimeResult<Self> {
        let raw: RawMessage = serde_json::from_str(line).map_err(|e| RuntimeError::Decode {
            src: None,
            msg_id: None,
            in_reply_to: None,
            code: ErrorCode::MalformedRequest,
            message: e.to_string(),
        })?;

        let msg_id = raw.body.get("msg_id").and_then(serde_json::Value::as_u64);
        let in_reply_to = raw.body.get("in_reply_to").and_then(serde_json::Value::as_u64);
        let kind = raw.body.get("type").and_then(serde_json::Value::as_str);
        let code = match kind {
            Some(kind) if Payload::KNOWN_TYPES.contains(&kind) => ErrorCode::MalformedRequest,
            Some(_) => ErrorCode::NotSupported,
            None => ErrorCode::MalformedRequest,
        };

        let body: Body = serde_json::from_value(raw.body).map_err(|e| RuntimeError::Decode {
            src: Some(raw.src.clone()),
            msg_id,
            in_reply_to,
            code,
            message: e.to_string(),
        })?;

        Ok(Self {
            src: raw.src,
            dest: raw.dest,
            body,
        })
    }

    /// Encodes the message as one line (without the trailing newline).
    ///
    /// # Errors
    ///
    /// Returns `Encode` if serialization fails.
    pub fn encode(&self) -> RuntimeResult<String> {
        serde_json::to_string(self).map_err(|e| RuntimeError::Encode {
            message: e.to_string(),
        })
    }
}

/// Envelope with an undecoded body, used to recover ids from bad input.
#[derive(Deserialize)]
struct RawMessage {
    src: NodeId,
    dest: NodeId,
    body: serde_json::Value,
}

// -----------------------------------------------------------------------------
// Payloads
// -----------------------------------------------------------------------------

/// Every body type the runtime understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Runtime handshake: assigns this node its identity and the cluster.
    Init {
        /// This node's id.
        node_id: NodeId,
        /// Every node in the cluster, including this one.
        node_ids: Vec<NodeId>,
    },
    /// Handshake acknowledgement.
    InitOk,

    /// Append `msg` to log `key`.
    Send {
        /// Target log.
        key: LogKey,
        /// Value to append.
        msg: i64,
    },
    /// The offset `msg` was appended at.
    SendOk {
        /// Allocated offset.
        offset: Offset,
    },

    /// Fetch entries at or after the given offset of each log.
    Poll {
        /// Log → minimum offset.
        offsets: BTreeMap<LogKey, Offset>,
    },
    /// Entries per log, ascending by offset.
    PollOk {
        /// Log → `[[offset, value], …]`.
        msgs: BTreeMap<LogKey, Vec<LogEntry>>,
    },

    /// Advance consumer watermarks.
    CommitOffsets {
        /// Log → offset processed.
        offsets: BTreeMap<LogKey, Offset>,
    },
    /// Watermarks advanced (or already ahead).
    CommitOffsetsOk,

    /// Query consumer watermarks.
    ListCommittedOffsets {
        /// Logs to query.
        keys: Vec<LogKey>,
    },
    /// Watermarks of the queried logs that were ever committed.
    ListCommittedOffsetsOk {
        /// Log → committed offset.
        offsets: BTreeMap<LogKey, Offset>,
    },

    /// Coordination store read.
    Read {
        /// Store key.
        key: String,
    },
    /// Coordination store read result.
    ReadOk {
        /// Stored value.
        value: u64,
    },
    /// Coordination store write.
    Write {
        /// Store key.
        key: String,
        /// New value.
        value: u64,
    },
    /// Coordination store write acknowledgement.
    WriteOk,
    /// Coordination store compare-and-swap.
    Cas {
        /// Store key.
        key: String,
        /// Expected value.
        from: u64,
        /// New value.
        to: u64,
        /// Create the key holding `to` if absent.
        #[serde(default)]
        create_if_not_exists: bool,
    },
    /// Coordination store compare-and-swap acknowledgement.
    CasOk,

    /// Error reply.
    Error {
        /// Machine-readable error code.
        code: ErrorCode,
        /// Human-readable description.
        #[serde(default)]
        text: String,
    },
}

impl Payload {
    /// Every `type` tag of [`Payload`].
    pub const KNOWN_TYPES: &'static [&'static str] = &[
        "init",
        "init_ok",
        "send",
        "send_ok",
        "poll",
        "poll_ok",
        "commit_offsets",
        "commit_offsets_ok",
        "list_committed_offsets",
        "list_committed_offsets_ok",
        "read",
        "read_ok",
        "write",
        "write_ok",
        "cas",
        "cas_ok",
        "error",
    ];

    /// Returns the wire `type` tag of this payload.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::InitOk => "init_ok",
            Self::Send { .. } => "send",
            Self::SendOk { .. } => "send_ok",
            Self::Poll { .. } => "poll",
            Self::PollOk { .. } => "poll_ok",
            Self::CommitOffsets { .. } => "commit_offsets",
            Self::CommitOffsetsOk => "commit_offsets_ok",
            Self::ListCommittedOffsets { .. } => "list_committed_offsets",
            Self::ListCommittedOffsetsOk { .. } => "list_committed_offsets_ok",
            Self::Read { .. } => "read",
            Self::ReadOk { .. } => "read_ok",
            Self::Write { .. } => "write",
            Self::WriteOk => "write_ok",
            Self::Cas { .. } => "cas",
            Self::CasOk => "cas_ok",
            Self::Error { .. } => "error",
        }
    }

    /// Builds an error payload.
    #[must_use]
    pub fn error(code: ErrorCode, text: impl Into<String>) -> Self {
        Self::Error {
            code,
            text: text.into(),
        }
    }
}

// -----------------------------------------------------------------------------
// Error Codes
// -----------------------------------------------------------------------------

/// Error codes carried by `error` bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum ErrorCode {
    /// The request did not complete in time; it may or may not have taken
    /// effect.
    Timeout,
    /// The request type is not supported by this node.
    NotSupported,
    /// The operation definitely did not happen; it is safe to retry.
    TemporarilyUnavailable,
    /// The request was malformed.
    MalformedRequest,
    /// The node hit an unrecoverable error.
    Crash,
    /// The operation definitely did not happen.
    Abort,
    /// The key does not exist.
    KeyDoesNotExist,
    /// The key already exists.
    KeyAlreadyExists,
    /// A compare-and-swap precondition did not hold.
    PreconditionFailed,
    /// A transaction conflicted.
    TxnConflict,
    /// Any other code.
    Other(u32),
}

impl ErrorCode {
    /// Returns true if the operation is known not to have happened.
    #[must_use]
    pub const fn is_definite(self) -> bool {
        !matches!(self, Self::Timeout | Self::Crash | Self::Other(_))
    }
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Timeout,
            10 => Self::NotSupported,
            11 => Self::TemporarilyUnavailable,
            12 => Self::MalformedRequest,
            13 => Self::Crash,
            14 => Self::Abort,
            20 => Self::KeyDoesNotExist,
            21 => Self::KeyAlreadyExists,
            22 => Self::PreconditionFailed,
            30 => Self::TxnConflict,
            other => Self::Other(other),
        }
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Timeout => 0,
            ErrorCode::NotSupported => 10,
            ErrorCode::TemporarilyUnavailable => 11,
            ErrorCode::MalformedRequest => 12,
            ErrorCode::Crash => 13,
            ErrorCode::Abort => 14,
            ErrorCode::KeyDoesNotExist => 20,
            ErrorCode::KeyAlreadyExists => 21,
            ErrorCode::PreconditionFailed => 22,
            ErrorCode::TxnConflict => 30,
            ErrorCode::Other(other) => other,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, u32::from(*self))
    }
}
