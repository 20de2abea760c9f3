//! Logical clock and drift correction arithmetic

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chronon_core::{TimeSource, Timestamp};

/// Shortest tick interval a correction may produce
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Manager time: a wall-clock source plus an accumulated correction offset
///
/// Every drift correction moves the offset halfway toward the external
/// reading. Readings never decrease: after a backward correction the clock
/// holds at its last reading until the corrected time catches up.
pub struct LogicalClock {
    source: Arc<dyn TimeSource>,
    offset_ms: AtomicI64,
    high_water_ms: AtomicU64,
}

impl LogicalClock {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        LogicalClock {
            source,
            offset_ms: AtomicI64::new(0),
            high_water_ms: AtomicU64::new(0),
        }
    }

    /// Current logical time, never earlier than any previous reading
    pub fn now(&self) -> Timestamp {
        let target = self.target().as_millis();
        let previous = self.high_water_ms.fetch_max(target, Ordering::SeqCst);
        Timestamp(previous.max(target))
    }

    /// Source time plus offset, without the monotonic hold
    ///
    /// Drift is measured against this reading.
    pub fn target(&self) -> Timestamp {
        self.source.now().offset(self.offset())
    }

    /// Accumulated correction in milliseconds
    pub fn offset(&self) -> i64 {
        self.offset_ms.load(Ordering::SeqCst)
    }

    /// Shift logical time by `delta_ms`
    pub fn nudge(&self, delta_ms: i64) {
        self.offset_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for LogicalClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalClock")
            .field("offset_ms", &self.offset())
            .finish()
    }
}

/// A planned drift correction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriftCorrection {
    /// `|external - internal|`
    pub deviation_ms: u64,
    /// External time reads later than internal time
    pub external_ahead: bool,
    /// Signed change applied to the nominal interval
    pub adjustment_ms: i64,
    /// Interval used for the correction window
    pub interval: Duration,
    /// Shift applied to the logical clock
    pub clock_nudge_ms: i64,
}

/// Plan a halfway correction for `signed_deviation_ms = external - internal`
///
/// External ahead shortens the interval by half the deviation, external
/// behind lengthens it by the same amount.
pub fn plan_correction(nominal: Duration, signed_deviation_ms: i64) -> DriftCorrection {
    let deviation_ms = signed_deviation_ms.unsigned_abs();
    let half = (deviation_ms / 2) as i64;
    let external_ahead = signed_deviation_ms > 0;
    let adjustment_ms = if external_ahead { -half } else { half };

    let nominal_ms = nominal.as_millis() as i64;
    let adjusted_ms = nominal_ms.saturating_add(adjustment_ms);
    let interval = Duration::from_millis(adjusted_ms.max(0) as u64).max(MIN_TICK_INTERVAL);

    DriftCorrection {
        deviation_ms,
        external_ahead,
        adjustment_ms,
        interval,
        clock_nudge_ms: if external_ahead { half } else { -half },
    }
}
