//! Linearizable coordination store abstraction for Quill.
//!
//! Every node of a Quill cluster shares one external linearizable key-value
//! service. It is the single source of truth for the per-log counters:
//!
//! - **`PrevOffset(key)`**: the last offset allocated for a log.
//! - **`CommittedOffset(key)`**: the highest offset a consumer acknowledged.
//!
//! Nodes only ever hold transient, possibly stale views of these counters;
//! all agreement happens through [`CoordStore::compare_and_swap`].
//!
//! # Testing
//!
//! The [`SimulatedCoordStore`] provides deterministic fault injection for
//! DST testing:
//!
//! ```ignore
//! use quill_coord::{CoordFaultConfig, SimulatedCoordStore};
//!
//! // Reject the next three CAS attempts as if another node won the race.
//! let config = CoordFaultConfig::none().with_forced_conflicts(3);
//! let store = SimulatedCoordStore::with_faults(seed, config);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod simulated;
mod store;

pub use error::{CoordError, CoordResult};
pub use simulated::{CoordFaultConfig, CoordStats, SimulatedCoordStore};
pub use store::{CoordStore, CounterKind};
