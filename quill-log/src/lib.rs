//! Quill Log - offset allocation, log storage and commit tracking.
//!
//! This crate holds the per-log state machinery of a Quill node:
//!
//! - [`OffsetAllocator`]: lock-free CAS loop over `PrevOffset(key)` that never
//!   hands out the same offset twice for a key, on any node.
//! - [`LogStore`]: in-memory map of key to entries, idempotent on offset.
//! - [`CommitTracker`]: monotonic commit watermark over `CommittedOffset(key)`
//!   with an explicit `committed <= allocated` invariant check.
//! - [`RetryPolicy`]: injectable bounds and backoff for the CAS loops.
//!
//! # Offset Convention
//!
//! An absent counter reads as `0`. The first offset allocated for any key is
//! `1`, so `n` sends to a key receive exactly `1..=n`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use quill_coord::SimulatedCoordStore;
//! use quill_log::{OffsetAllocator, RetryPolicy};
//!
//! let store = Arc::new(SimulatedCoordStore::new(42));
//! let allocator = OffsetAllocator::new(store, RetryPolicy::default());
//! let offset = allocator.allocate(&"orders".into()).await?;
//! assert_eq!(offset.get(), 1);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod allocator;
mod commit;
mod error;
mod retry;
mod store;

pub use allocator::OffsetAllocator;
pub use commit::{CommitOutcome, CommitTracker};
pub use error::{LogError, LogResult};
pub use retry::RetryPolicy;
pub use store::LogStore;
