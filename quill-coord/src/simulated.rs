//! In-memory coordination store for deterministic simulation testing.
//!
//! `SimulatedCoordStore` is linearizable by construction (a single mutex
//! orders every operation) and supports seeded fault injection so tests can
//! exercise conflict retries and store outages reproducibly.

#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::trace;

use crate::error::{CoordError, CoordResult};
use crate::store::CoordStore;

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// Fault configuration for the simulated coordination store.
#[derive(Debug, Clone, Default)]
pub struct CoordFaultConfig {
    /// Probability of read operations failing (0.0 - 1.0).
    pub read_fail_rate: f64,
    /// Probability of write operations failing (0.0 - 1.0).
    pub write_fail_rate: f64,
    /// Probability of compare-and-swap operations failing (0.0 - 1.0).
    pub cas_fail_rate: f64,
    /// Force next read to fail (one-shot).
    pub force_read_fail: bool,
    /// Force next compare-and-swap to fail (one-shot).
    pub force_cas_fail: bool,
    /// Number of upcoming compare-and-swaps to reject as conflicts.
    ///
    /// Simulates another writer winning the race without any real contention.
    pub forced_conflicts: u32,
}

impl CoordFaultConfig {
    /// No faults (all operations succeed).
    #[must_use]
    pub const fn none() -> Self {
        Self {
            read_fail_rate: 0.0,
            write_fail_rate: 0.0,
            cas_fail_rate: 0.0,
            force_read_fail: false,
            force_cas_fail: false,
            forced_conflicts: 0,
        }
    }

    /// Flaky configuration for stress testing.
    #[must_use]
    pub const fn flaky() -> Self {
        Self {
            read_fail_rate: 0.05,
            write_fail_rate: 0.05,
            cas_fail_rate: 0.05,
            force_read_fail: false,
            force_cas_fail: false,
            forced_conflicts: 0,
        }
    }

    /// Builder: set read fail rate.
    #[must_use]
    pub const fn with_read_fail_rate(mut self, rate: f64) -> Self {
        self.read_fail_rate = rate;
        self
    }

    /// Builder: reject the next `count` compare-and-swaps as conflicts.
    #[must_use]
    pub const fn with_forced_conflicts(mut self, count: u32) -> Self {
        self.forced_conflicts = count;
        self
    }
}

// -----------------------------------------------------------------------------
// Operation Counters
// -----------------------------------------------------------------------------

/// Counts of operations the store has served, for assertions in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordStats {
    /// Reads attempted.
    pub reads: u64,
    /// Writes attempted.
    pub writes: u64,
    /// Compare-and-swaps attempted.
    pub cas_attempts: u64,
    /// Compare-and-swaps rejected with `PreconditionFailed`.
    pub cas_conflicts: u64,
}

// -----------------------------------------------------------------------------
// Simulated Coordination Store
// -----------------------------------------------------------------------------

/// In-memory simulated coordination store for DST.
///
/// Clones share state via `Arc`, so one store can back every node of a
/// simulated cluster exactly like the external `lin-kv` service does.
#[derive(Debug, Clone)]
pub struct SimulatedCoordStore {
    /// Stored counters.
    values: Arc<Mutex<HashMap<String, u64>>>,
    /// Fault configuration.
    fault_config: Arc<Mutex<CoordFaultConfig>>,
    /// Operation counters.
    stats: Arc<Mutex<CoordStats>>,
    /// RNG seed for deterministic faults.
    seed: u64,
    /// Operation counter for deterministic RNG.
    counter: Arc<AtomicU64>,
}

impl SimulatedCoordStore {
    /// Creates a new simulated store with no faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, CoordFaultConfig::none())
    }

    /// Creates a simulated store with fault injection.
    #[must_use]
    pub fn with_faults(seed: u64, config: CoordFaultConfig) -> Self {
        Self {
            values: Arc::new(Mutex::new(HashMap::new())),
            fault_config: Arc::new(Mutex::new(config)),
            stats: Arc::new(Mutex::new(CoordStats::default())),
            seed,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns fault config for modification.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn fault_config(&self) -> std::sync::MutexGuard<'_, CoordFaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Returns a snapshot of the operation counters.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn stats(&self) -> CoordStats {
        *self.stats.lock().expect("stats lock poisoned")
    }

    /// Returns the stored value (bypasses faults, for invariant checking in tests).
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<u64> {
        self.values.lock().expect("values lock poisoned").get(key).copied()
    }

    /// Overwrites a value (bypasses faults, for corrupting state in tests).
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn poke(&self, key: &str, value: u64) {
        self.values
            .lock()
            .expect("values lock poisoned")
            .insert(key.to_string(), value);
    }

    /// Deterministic RNG following the `(seed + counter) * M` pattern.
    fn should_inject_fault(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let hash = self
            .seed
            .wrapping_add(counter)
            .wrapping_mul(0x9e37_79b9_7f4a_7c15);
        #[allow(clippy::cast_precision_loss)]
        let normalized = (hash as f64) / (u64::MAX as f64);
        normalized < rate
    }

    fn unavailable(operation: &'static str, cause: &str) -> CoordError {
        trace!(operation, cause, "Injected coordination store fault");
        CoordError::Unavailable {
            operation,
            message: format!("simulated failure ({cause})"),
        }
    }

    fn record(&self, update: impl FnOnce(&mut CoordStats)) {
        update(&mut *self.stats.lock().expect("stats lock poisoned"));
    }
}

#[async_trait]
impl CoordStore for SimulatedCoordStore {
    async fn read(&self, key: &str) -> CoordResult<Option<u64>> {
        // Let concurrent callers interleave between read and CAS.
        tokio::task::yield_now().await;
        self.record(|s| s.reads += 1);

        {
            let mut config = self.fault_config.lock().expect("lock poisoned");
            if config.force_read_fail {
                config.force_read_fail = false;
                return Err(Self::unavailable("read", "forced"));
            }
        }

        let rate = self.fault_config.lock().expect("lock").read_fail_rate;
        if self.should_inject_fault(rate) {
            return Err(Self::unavailable("read", "random"));
        }

        Ok(self.peek(key))
    }

    async fn write(&self, key: &str, value: u64) -> CoordResult<()> {
        tokio::task::yield_now().await;
        self.record(|s| s.writes += 1);

        let rate = self.fault_config.lock().expect("lock").write_fail_rate;
        if self.should_inject_fault(rate) {
            return Err(Self::unavailable("write", "random"));
        }

        self.poke(key, value);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: u64,
        new: u64,
        create_if_missing: bool,
    ) -> CoordResult<()> {
        tokio::task::yield_now().await;
        self.record(|s| s.cas_attempts += 1);

        {
            let mut config = self.fault_config.lock().expect("lock poisoned");
            if config.force_cas_fail {
                config.force_cas_fail = false;
                return Err(Self::unavailable("cas", "forced"));
            }
            if config.forced_conflicts > 0 {
                config.forced_conflicts -= 1;
                drop(config);
                self.record(|s| s.cas_conflicts += 1);
                return Err(CoordError::PreconditionFailed {
                    key: key.to_string(),
                    expected,
                    actual: None,
                });
            }
        }

        let rate = self.fault_config.lock().expect("lock").cas_fail_rate;
        if self.should_inject_fault(rate) {
            return Err(Self::unavailable("cas", "random"));
        }

        let mut values = self.values.lock().expect("values lock poisoned");
        match values.get(key).copied() {
            Some(current) if current == expected => {
                values.insert(key.to_string(), new);
                Ok(())
            }
            Some(current) => {
                drop(values);
                self.record(|s| s.cas_conflicts += 1);
                Err(CoordError::PreconditionFailed {
                    key: key.to_string(),
                    expected,
                    actual: Some(current),
                })
            }
            None if create_if_missing => {
                values.insert(key.to_string(), new);
                Ok(())
            }
            None => Err(CoordError::KeyAbsent {
                key: key.to_string(),
            }),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
