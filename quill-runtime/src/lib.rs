//! Quill Runtime - node process plumbing.
//!
//! Hosts a service on the JSON-lines message protocol and gives it a way to
//! talk to the rest of the cluster:
//!
//! - [`message`]: the envelope, typed [`Payload`]s and [`ErrorCode`]s.
//! - [`Node`]: init handshake, request dispatch and reply correlation over
//!   stdin/stdout.
//! - [`Transport`] / [`Handler`]: the seams between runtime and service, so
//!   the same service runs inside a simulated cluster in tests.
//! - [`LinKvStore`]: a [`quill_coord::CoordStore`] over the `lin-kv` service.
//!
//! # Example
//!
//! ```ignore
//! let node = Node::new(RuntimeConfig::default());
//! node.run(|handle| MyService::new(handle)).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod kv;
pub mod message;
mod node;
mod transport;

pub use config::{ConfigError, RuntimeConfig, DEFAULT_COORD_SERVICE};
pub use error::{RuntimeError, RuntimeResult};
pub use kv::LinKvStore;
pub use message::{Body, ErrorCode, Message, Payload};
pub use node::{Node, NodeHandle};
pub use transport::{Handler, HandlerError, Transport};
