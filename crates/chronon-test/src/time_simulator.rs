//! Drift Simulator - a manager synchronizing against a drifting reference
//!
//! Simulates:
//! - A local wall clock advancing one tick interval per round
//! - An external reference clock with drift and jitter
//! - Periodic synchronization and its effect on logical time

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chronon_core::{ChrononResult, ManualClock, TimeSource, Timestamp};
use chronon_time::{ChrononConfig, ChrononManager};
use chronon_vdf::{VdfAlgorithm, VdfConfig, VdfEngine};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Start of simulated time
pub const SIMULATION_EPOCH: Timestamp = Timestamp(1_700_000_000_000);

/// Clock drift model for the reference clock
#[derive(Clone, Debug)]
pub struct ClockDriftModel {
    /// Drift rate (1.0 = perfect, >1.0 = fast, <1.0 = slow)
    pub drift_rate: f64,
    /// Random jitter per step (milliseconds)
    pub jitter_ms: u32,
    accumulated_ms: i64,
}

impl ClockDriftModel {
    pub fn new(drift_rate: f64, jitter_ms: u32) -> Self {
        ClockDriftModel {
            drift_rate,
            jitter_ms,
            accumulated_ms: 0,
        }
    }

    pub fn perfect() -> Self {
        Self::new(1.0, 0)
    }

    /// Gains 5% per step
    pub fn fast() -> Self {
        Self::new(1.05, 5)
    }

    /// Loses 5% per step
    pub fn slow() -> Self {
        Self::new(0.95, 5)
    }

    /// No trend, heavy jitter
    pub fn unstable() -> Self {
        Self::new(1.0, 80)
    }

    /// Drifted length of `dt`
    pub fn apply(&mut self, dt: Duration, rng: &mut StdRng) -> Duration {
        let base_ms = dt.as_millis() as f64;
        let jitter = if self.jitter_ms > 0 {
            rng.gen_range(-(self.jitter_ms as i64)..=self.jitter_ms as i64) as f64
        } else {
            0.0
        };
        let final_ms = (base_ms * self.drift_rate + jitter).max(0.0) as u64;
        self.accumulated_ms += final_ms as i64 - base_ms as i64;
        Duration::from_millis(final_ms)
    }

    /// Signed drift accumulated so far
    pub fn accumulated_ms(&self) -> i64 {
        self.accumulated_ms
    }
}

/// Reference clock advanced through a drift model
pub struct DriftingClock {
    millis: AtomicU64,
    model: Mutex<(ClockDriftModel, StdRng)>,
}

impl DriftingClock {
    pub fn new(start: Timestamp, model: ClockDriftModel, seed: u64) -> Self {
        DriftingClock {
            millis: AtomicU64::new(start.as_millis()),
            model: Mutex::new((model, StdRng::seed_from_u64(seed))),
        }
    }

    /// Advance by the drifted length of `real_dt`
    pub fn advance(&self, real_dt: Duration) {
        let step = {
            let mut guard = self.model.lock();
            let (model, rng) = &mut *guard;
            model.apply(real_dt, rng)
        };
        self.millis
            .fetch_add(step.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn accumulated_ms(&self) -> i64 {
        self.model.lock().0.accumulated_ms()
    }
}

impl TimeSource for DriftingClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}

/// Drift simulation scenario
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub tick_interval: Duration,
    pub difficulty: u32,
    pub rounds: u64,
    /// Synchronize after every this many rounds
    pub sync_every: u64,
    pub drift: ClockDriftModel,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            tick_interval: Duration::from_millis(1_000),
            difficulty: 4,
            rounds: 50,
            sync_every: 5,
            drift: ClockDriftModel::perfect(),
            seed: 7,
        }
    }
}

impl SimulationConfig {
    pub fn with_drift(mut self, drift: ClockDriftModel) -> Self {
        self.drift = drift;
        self
    }
}

/// One synchronization observed by the simulator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncSample {
    pub round: u64,
    pub before_ms: u64,
    pub after_ms: u64,
    pub accepted: bool,
}

#[derive(Clone, Debug, Default)]
pub struct SimulationResult {
    pub rounds: u64,
    pub chronons: u64,
    pub chain_valid: bool,
    pub samples: Vec<SyncSample>,
    pub reference_drift_ms: i64,
}

impl SimulationResult {
    /// Every corrected sync closed at least 40% of its deviation
    pub fn converges(&self, tolerance_ms: u64) -> bool {
        self.samples.iter().all(|s| {
            s.before_ms <= tolerance_ms || s.after_ms as f64 <= 0.6 * s.before_ms as f64
        })
    }

    /// Largest deviation left after a sync
    pub fn max_residual_ms(&self) -> u64 {
        self.samples.iter().map(|s| s.after_ms).max().unwrap_or(0)
    }

    pub fn passed(&self, tolerance_ms: u64) -> bool {
        self.chain_valid
            && self.chronons == self.rounds
            && self.samples.iter().all(|s| s.accepted)
            && self.converges(tolerance_ms)
    }
}

/// Manager driven by hand against a drifting reference
pub struct DriftSimulator {
    config: SimulationConfig,
    local: Arc<ManualClock>,
    reference: Arc<DriftingClock>,
    manager: ChrononManager,
}

impl DriftSimulator {
    pub fn new(config: SimulationConfig) -> ChrononResult<Self> {
        let local = Arc::new(ManualClock::new(SIMULATION_EPOCH));
        let reference = Arc::new(DriftingClock::new(
            SIMULATION_EPOCH,
            config.drift.clone(),
            config.seed,
        ));

        let chronon = ChrononConfig {
            tick_interval: config.tick_interval,
            ..Default::default()
        };
        let vdf = VdfEngine::with_config(VdfConfig::untimed(
            config.difficulty,
            VdfAlgorithm::Squaring,
        ));
        let manager = ChrononManager::with_time_source(chronon, Arc::new(vdf), local.clone())?;

        Ok(DriftSimulator {
            config,
            local,
            reference,
            manager,
        })
    }

    pub fn manager(&self) -> &ChrononManager {
        &self.manager
    }

    pub fn reference(&self) -> &Arc<DriftingClock> {
        &self.reference
    }

    fn deviation_ms(&self) -> u64 {
        self.reference
            .now()
            .signed_diff(self.manager.corrected_now())
            .unsigned_abs()
    }

    /// Run every round, then shut the manager down
    pub async fn run(&mut self) -> ChrononResult<SimulationResult> {
        self.manager.initialize().await?;
        let mut result = SimulationResult {
            rounds: self.config.rounds,
            ..Default::default()
        };

        for round in 1..=self.config.rounds {
            self.local.advance(self.config.tick_interval);
            self.reference.advance(self.config.tick_interval);
            self.manager.advance().await?;

            if self.config.sync_every > 0 && round % self.config.sync_every == 0 {
                let before_ms = self.deviation_ms();
                let accepted = self.manager.synchronize(self.reference.now());
                let after_ms = self.deviation_ms();
                debug!(round, before_ms, after_ms, "Simulated sync");
                result.samples.push(SyncSample {
                    round,
                    before_ms,
                    after_ms,
                    accepted,
                });
            }
        }

        result.chronons = self.manager.current_number();
        result.chain_valid = self.manager.validate_chain();
        result.reference_drift_ms = self.reference.accumulated_ms();
        self.manager.shutdown();
        Ok(result)
    }
}
