//! Synchronization metrics

use chronon_core::Timestamp;
use serde::Serialize;

/// Process-wide synchronization counters
///
/// Mutated by `synchronize` and by every advance attempt.
/// INVARIANT: `sync_attempts == sync_successes + sync_failures`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SynchronizationMetrics {
    pub deviation_ms: u64,
    pub last_sync: Timestamp,
    pub sync_attempts: u64,
    pub sync_successes: u64,
    pub sync_failures: u64,
}

impl SynchronizationMetrics {
    pub fn new(now: Timestamp) -> Self {
        SynchronizationMetrics {
            last_sync: now,
            ..Default::default()
        }
    }

    pub fn record_deviation(&mut self, deviation_ms: u64, at: Timestamp) {
        self.deviation_ms = deviation_ms;
        self.last_sync = at;
    }

    pub fn record_success(&mut self, at: Timestamp) {
        self.sync_attempts += 1;
        self.sync_successes += 1;
        self.last_sync = at;
    }

    pub fn record_failure(&mut self, at: Timestamp) {
        self.sync_attempts += 1;
        self.sync_failures += 1;
        self.last_sync = at;
    }

    /// Fraction of attempts that succeeded, 1.0 before any attempt
    pub fn success_ratio(&self) -> f64 {
        if self.sync_attempts == 0 {
            1.0
        } else {
            self.sync_successes as f64 / self.sync_attempts as f64
        }
    }
}
