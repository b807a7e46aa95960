//! Quill commit-log service.
//!
//! This crate provides the request handlers of a Quill node (`send`, `poll`,
//! `commit_offsets`, `list_committed_offsets`), poll reconciliation across
//! peers, and the `quill-server` binary that hosts them on the node runtime.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod service;

pub use config::ServiceConfig;
pub use error::{ServerError, ServerResult};
pub use service::LogService;
