//! Quill Tests - simulation and integration testing for Quill.
//!
//! This crate contains the multi-node and wire-level tests for Quill. Tests
//! are organized by type:
//!
//! ## Test Organization
//!
//! **DST Tests** (`*_dst.rs`): Seeded random workloads with fault injection
//! - `service_dst`: concurrent clients against a cluster over a flaky,
//!   contended or partitioned environment, checked by `PropertyChecker`
//!
//! **Integration Tests** (`*_tests.rs`): Multi-component integration
//! - `cluster_tests`: send/poll/commit/list across simulated nodes
//! - `node_tests`: the full node stack over JSON lines, with the test playing
//!   client and `lin-kv`
//!
//! **Support Modules**:
//! - `simulated_cluster`: in-process cluster with partition injection
//! - `properties`: client-visible guarantees and their checker
//! - `scenarios`: reusable cluster sizes, faults, workloads and seeds
//!
//! ## Naming Conventions
//!
//! - DST tests: `test_dst_<component>_<scenario>`
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;
pub mod scenarios;
pub mod simulated_cluster;

// DST test modules (seeded workloads with fault injection).
#[cfg(test)]
mod service_dst;

// Integration test modules (multi-component tests).
#[cfg(test)]
mod cluster_tests;
