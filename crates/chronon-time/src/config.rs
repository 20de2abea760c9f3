//! Chronon Manager configuration

use std::time::Duration;

use chronon_core::{ChrononError, ChrononResult};

use crate::STATISTICS_WINDOW;

/// Chronon Manager configuration
#[derive(Clone, Debug, PartialEq)]
pub struct ChrononConfig {
    /// Nominal duration of one chronon
    pub tick_interval: Duration,
    /// How long a drift correction keeps the adjusted interval
    pub correction_window: Duration,
    /// Deviation tolerated before correcting, as a fraction of the interval
    pub sync_tolerance: f64,
    /// Chronons considered by statistics
    pub stats_window: usize,
    /// Capacity of the broadcast event channel
    pub event_capacity: usize,
}

impl Default for ChrononConfig {
    fn default() -> Self {
        ChrononConfig {
            tick_interval: Duration::from_millis(1_000),
            correction_window: Duration::from_secs(60),
            sync_tolerance: 0.1,
            stats_window: STATISTICS_WINDOW,
            event_capacity: 256,
        }
    }
}

impl ChrononConfig {
    pub fn with_interval_ms(tick_interval_ms: u64) -> Self {
        ChrononConfig {
            tick_interval: Duration::from_millis(tick_interval_ms),
            ..Default::default()
        }
    }

    /// Read `CHRONON_TICK_INTERVAL_MS`
    pub fn from_env() -> ChrononResult<Self> {
        let mut config = ChrononConfig::default();
        if let Ok(raw) = std::env::var("CHRONON_TICK_INTERVAL_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                ChrononError::InvalidConfig(format!("CHRONON_TICK_INTERVAL_MS: {raw:?}"))
            })?;
            config.tick_interval = Duration::from_millis(ms);
        }
        config.validate()?;
        Ok(config)
    }

    /// Maximum deviation before a correction runs
    pub fn max_deviation_ms(&self) -> f64 {
        self.tick_interval.as_millis() as f64 * self.sync_tolerance
    }

    pub fn validate(&self) -> ChrononResult<()> {
        if self.tick_interval.as_millis() == 0 {
            return Err(ChrononError::InvalidConfig(
                "tick interval must be at least 1ms".into(),
            ));
        }
        if !(self.sync_tolerance.is_finite() && self.sync_tolerance >= 0.0) {
            return Err(ChrononError::InvalidConfig(format!(
                "sync tolerance must be non-negative, got {}",
                self.sync_tolerance
            )));
        }
        if self.stats_window == 0 {
            return Err(ChrononError::InvalidConfig(
                "statistics window must be positive".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ChrononError::InvalidConfig(
                "event capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}
