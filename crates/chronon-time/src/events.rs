//! Tick subscribers and the manager event stream

use std::sync::Arc;
use std::time::Duration;

use chronon_core::{ChainHash, ChrononError, Timestamp};
use parking_lot::RwLock;

/// Callback fired once per appended chronon with its number
pub type TickCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Events broadcast by the Chronon Manager
#[derive(Clone, Debug, PartialEq)]
pub enum ChrononEvent {
    /// A chronon was appended (genesis included)
    Created { number: u64, hash: ChainHash },
    /// Subscribers were notified of a new chronon
    Tick(u64),
    /// An advance failed; the chain did not grow this tick
    AdvanceFailed { attempted: u64, error: ChrononError },
    /// A transaction was recorded against a chronon
    TransactionAdded { chronon: u64 },
    /// External time was compared against logical time
    Synchronized {
        deviation_ms: u64,
        external: Timestamp,
        internal: Timestamp,
    },
    SynchronizationFailed { error: ChrononError },
    /// Drift correction replaced the tick interval
    IntervalAdjusted { from: Duration, to: Duration },
    /// The correction window elapsed
    IntervalRestored { interval: Duration },
    Shutdown,
}

/// Registered tick callbacks, notified in registration order
#[derive(Default)]
pub struct Subscribers {
    callbacks: RwLock<Vec<TickCallback>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, callback: TickCallback) {
        self.callbacks.write().push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every callback on the calling task
    pub fn notify(&self, number: u64) {
        // Snapshot so a callback may subscribe without deadlocking
        let callbacks: Vec<TickCallback> = self.callbacks.read().clone();
        for callback in callbacks {
            callback(number);
        }
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.len())
            .finish()
    }
}
