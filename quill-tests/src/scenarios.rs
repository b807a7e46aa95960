//! Reusable test scenarios for Quill simulation.
//!
//! Scenarios define common cluster shapes, fault patterns and workloads
//! that can be composed to create comprehensive tests.

/// Standard cluster sizes.
pub mod clusters {
    /// A single node; every poll is answered locally.
    pub const SINGLE_NODE: usize = 1;

    /// Two nodes, the smallest cluster that needs reconciliation.
    pub const TWO_NODE: usize = 2;

    /// Three nodes, enough for a partitioned minority.
    pub const THREE_NODE: usize = 3;

    /// Five nodes for heavier contention.
    pub const FIVE_NODE: usize = 5;
}

/// Common fault injection patterns.
pub mod faults {
    use quill_coord::CoordFaultConfig;

    /// Coordination store that fails a small share of every operation.
    #[must_use]
    pub const fn flaky_store() -> CoordFaultConfig {
        CoordFaultConfig::flaky()
    }

    /// Coordination store that loses `count` CAS races in a row before
    /// behaving normally.
    #[must_use]
    pub const fn contended_store(count: u32) -> CoordFaultConfig {
        CoordFaultConfig::none().with_forced_conflicts(count)
    }
}

/// Client workload shapes.
pub mod workloads {
    /// Logs a workload spreads its sends over.
    pub const KEYS: &[&str] = &["orders", "payments", "audit"];

    /// Sends each client issues per round.
    pub const SENDS_PER_CLIENT: usize = 8;

    /// Concurrent clients per round.
    pub const CLIENTS: usize = 4;
}

/// Seeds for reproducible testing.
pub mod seeds {
    /// Standard test seeds.
    pub const REGRESSION_SEEDS: &[u64] = &[
        42,
        12345,
        0xDEAD_BEEF,
        999,
        7777,
        0x1337,
        0xCAFE_BABE,
        1,
        u64::MAX,
        0,
    ];
}
