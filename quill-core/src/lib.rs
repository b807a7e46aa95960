//! Quill Core - Strongly-typed identifiers, log entries and limits.
//!
//! This crate provides the vocabulary shared by every other Quill crate. It
//! does NOT know about the coordination store, the node runtime or the wire
//! envelope; those live in `quill-coord` and `quill-runtime`.
//!
//! # Design Principles (TigerStyle)
//!
//! - **Strongly-typed names**: Prevent mixing up a `NodeId` with a `LogKey`
//! - **Explicit limits**: Every request shape has a bounded maximum
//! - **Explicit types**: Offsets are `u64`, values are `i64`
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod limits;
mod types;

pub use error::{Error, Result};
pub use limits::Limits;
pub use types::{LogEntry, LogKey, NodeId, Offset};
