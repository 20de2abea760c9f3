//! Time primitives for the chronon clock
//!
//! Chronons carry wall-clock timestamps in milliseconds since the UNIX epoch.
//! Where that reading comes from is abstracted behind [`TimeSource`] so the
//! manager can run against the system clock in production and against a
//! hand-driven clock in tests and simulations.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Milliseconds since the UNIX epoch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Current system time
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Timestamp(millis)
    }

    /// Signed distance `self - earlier` in milliseconds
    #[inline]
    pub fn signed_diff(self, earlier: Timestamp) -> i64 {
        self.0 as i64 - earlier.0 as i64
    }

    /// Shift by a signed millisecond offset, saturating at the epoch
    #[inline]
    pub fn offset(self, millis: i64) -> Self {
        if millis >= 0 {
            Timestamp(self.0.saturating_add(millis as u64))
        } else {
            Timestamp(self.0.saturating_sub(millis.unsigned_abs()))
        }
    }

    #[inline]
    pub fn saturating_add(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.as_millis() as u64))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t({}ms)", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of wall-clock readings
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// System wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        ManualClock {
            millis: AtomicU64::new(start.0),
        }
    }

    pub fn set(&self, t: Timestamp) {
        self.millis.store(t.0, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}
