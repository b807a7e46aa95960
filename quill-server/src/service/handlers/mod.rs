//! Handler implementations for the log service.
//!
//! Each module adds the `*_internal` methods for one family of requests to
//! `LogService`:
//!
//! - `produce`: `send` (allocate an offset, append locally)
//! - `consume`: `poll` (local range plus peer reconciliation)
//! - `offsets`: `commit_offsets` and `list_committed_offsets`

mod consume;
mod offsets;
mod produce;
