//! Chronon Manager - drives the chain forward one VDF proof per tick
//!
//! The manager owns the chain, a periodic driver task and the drift
//! correction state:
//! - `initialize` creates genesis and starts the driver
//! - every tick runs `advance`: challenge, compute, hash, append, notify
//! - `synchronize` compares an external reading with logical time and,
//!   past tolerance, shortens or lengthens the interval for one
//!   correction window
//! - `shutdown` stops the driver and any pending restoration

use std::sync::{Arc, Weak};
use std::time::Duration;

use chronon_core::{
    ChainHash, ChrononError, ChrononResult, SystemClock, TimeSource, Timestamp,
};
use chronon_vdf::VdfEngine;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    plan_correction, ChainReport, Chronon, ChrononChain, ChrononConfig, ChrononEvent,
    ChrononStatistics, LogicalClock, Subscribers, SynchronizationMetrics, Transaction,
};

/// Lifecycle of a manager
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

/// Result of a single `advance` call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Chronon with this number was appended
    Advanced(u64),
    /// Another advance was in flight; nothing was done
    Coalesced,
}

/// Chronon Manager handle
///
/// Cheap to clone; all clones drive the same chain.
#[derive(Clone)]
pub struct ChrononManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ChrononConfig,
    vdf: Arc<VdfEngine>,
    clock: LogicalClock,
    chain: RwLock<ChrononChain>,
    metrics: Mutex<SynchronizationMetrics>,
    state: Mutex<ManagerState>,
    /// Held for the whole of one advance
    advance_gate: tokio::sync::Mutex<()>,
    subscribers: Subscribers,
    events: broadcast::Sender<ChrononEvent>,
    /// Current tick interval; the driver rebuilds its ticker on change
    interval_tx: watch::Sender<Duration>,
    runtime: Mutex<Option<Handle>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    restore: Mutex<Option<JoinHandle<()>>>,
}

impl ChrononManager {
    /// Manager with a nominal tick interval in milliseconds
    pub fn new(tick_interval_ms: u64, vdf: VdfEngine) -> ChrononResult<Self> {
        Self::with_config(ChrononConfig::with_interval_ms(tick_interval_ms), Arc::new(vdf))
    }

    pub fn with_config(config: ChrononConfig, vdf: Arc<VdfEngine>) -> ChrononResult<Self> {
        Self::with_time_source(config, vdf, Arc::new(SystemClock))
    }

    /// Manager reading wall-clock time from `source`
    pub fn with_time_source(
        config: ChrononConfig,
        vdf: Arc<VdfEngine>,
        source: Arc<dyn TimeSource>,
    ) -> ChrononResult<Self> {
        config.validate()?;

        let clock = LogicalClock::new(source);
        let metrics = SynchronizationMetrics::new(clock.now());
        let (events, _) = broadcast::channel(config.event_capacity);
        let (interval_tx, _) = watch::channel(config.tick_interval);

        Ok(ChrononManager {
            inner: Arc::new(Inner {
                config,
                vdf,
                clock,
                chain: RwLock::new(ChrononChain::new()),
                metrics: Mutex::new(metrics),
                state: Mutex::new(ManagerState::Uninitialized),
                advance_gate: tokio::sync::Mutex::new(()),
                subscribers: Subscribers::new(),
                events,
                interval_tx,
                runtime: Mutex::new(None),
                driver: Mutex::new(None),
                restore: Mutex::new(None),
            }),
        })
    }

    /// Create genesis and start the periodic driver
    pub async fn initialize(&self) -> ChrononResult<()> {
        let inner = &self.inner;
        let handle = Handle::try_current().map_err(|_| {
            ChrononError::InvalidConfig("initialize requires a tokio runtime".into())
        })?;

        {
            let mut state = inner.state.lock();
            match *state {
                ManagerState::Uninitialized => {}
                ManagerState::Stopped => return Err(ChrononError::Stopped),
                _ => return Err(ChrononError::AlreadyInitialized),
            }

            let timestamp = inner.clock.now();
            let hash = inner.chain.write().push_genesis(timestamp)?.hash;
            *state = ManagerState::Initialized;
            inner.emit(ChrononEvent::Created { number: 0, hash });
        }

        *inner.runtime.lock() = Some(handle.clone());
        *inner.driver.lock() = Some(spawn_driver(inner, &handle));
        {
            let mut state = inner.state.lock();
            if *state != ManagerState::Initialized {
                return Err(ChrononError::Stopped);
            }
            *state = ManagerState::Running;
        }

        info!(
            tick_interval_ms = inner.config.tick_interval.as_millis() as u64,
            difficulty = inner.vdf.difficulty(),
            algorithm = %inner.vdf.algorithm(),
            "Chronon manager initialized"
        );
        Ok(())
    }

    /// Produce the next chronon now
    ///
    /// Returns [`AdvanceOutcome::Coalesced`] without doing anything when
    /// another advance is already running.
    pub async fn advance(&self) -> ChrononResult<AdvanceOutcome> {
        self.inner.advance().await
    }

    /// Compare `external` against logical time and correct drift
    ///
    /// Returns `false` and counts a failure when the manager is not
    /// running. Also requires the tokio runtime that ran `initialize`.
    pub fn synchronize(&self, external: Timestamp) -> bool {
        match self.inner.synchronize(external) {
            Ok(()) => true,
            Err(e) => {
                warn!("Synchronization failed: {}", e);
                self.inner.metrics.lock().record_failure(self.inner.clock.now());
                self.inner
                    .emit(ChrononEvent::SynchronizationFailed { error: e });
                false
            }
        }
    }

    /// Stop the driver and any pending interval restoration
    ///
    /// Idempotent; valid in every state.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        let previous = std::mem::replace(&mut *inner.state.lock(), ManagerState::Stopped);

        if let Some(driver) = inner.driver.lock().take() {
            driver.abort();
        }
        if let Some(restore) = inner.restore.lock().take() {
            restore.abort();
        }

        if previous != ManagerState::Stopped {
            info!(
                chronons = inner.chain.read().len(),
                "Chronon manager shut down"
            );
            inner.emit(ChrononEvent::Shutdown);
        }
    }

    /// Number of the current chronon, 0 before initialization
    pub fn current_number(&self) -> u64 {
        self.inner.chain.read().current_number().unwrap_or(0)
    }

    pub fn current(&self) -> Option<Chronon> {
        self.inner.chain.read().current().cloned()
    }

    pub fn chronon(&self, number: u64) -> Option<Chronon> {
        self.inner.chain.read().get(number).cloned()
    }

    /// Like [`ChrononManager::chronon`], as an error
    pub fn require_chronon(&self, number: u64) -> ChrononResult<Chronon> {
        self.chronon(number)
            .ok_or(ChrononError::ChrononNotFound(number))
    }

    /// Up to `count` chronons, newest first
    pub fn recent(&self, count: usize) -> Vec<Chronon> {
        self.inner.chain.read().recent(count)
    }

    /// Chronons `start..=end`, clamped to the chain
    pub fn range(&self, start: u64, end: u64) -> Vec<Chronon> {
        self.inner.chain.read().range(start, end)
    }

    /// Record a transaction against the current chronon
    pub fn add_transaction(&self, tx: impl Into<Transaction>) -> bool {
        let inner = &self.inner;
        let added = {
            let mut chain = inner.chain.write();
            chain
                .add_transaction(tx.into())
                .then(|| chain.current_number())
                .flatten()
        };
        match added {
            Some(chronon) => {
                inner.emit(ChrononEvent::TransactionAdded { chronon });
                true
            }
            None => false,
        }
    }

    /// Record a transaction against chronon `number` if it is still current
    pub fn add_transaction_to(&self, number: u64, tx: impl Into<Transaction>) -> bool {
        let added = self.inner.chain.write().add_transaction_to(number, tx.into());
        if added {
            self.inner
                .emit(ChrononEvent::TransactionAdded { chronon: number });
        }
        added
    }

    pub fn transactions(&self, number: u64) -> Vec<Transaction> {
        self.inner.chain.read().transactions(number)
    }

    pub fn validate_chain(&self) -> bool {
        self.validate_chain_report().is_valid()
    }

    pub fn validate_chain_report(&self) -> ChainReport {
        let report = self.inner.chain.read().validate();
        if !report.is_valid() {
            warn!(
                violations = report.violations.len(),
                "Chain validation failed: {}",
                report.violations[0]
            );
        }
        report
    }

    /// Statistics over the most recent chronons
    pub fn statistics(&self) -> ChrononStatistics {
        self.inner
            .chain
            .read()
            .statistics(self.inner.config.stats_window)
    }

    pub fn sync_metrics(&self) -> SynchronizationMetrics {
        self.inner.metrics.lock().clone()
    }

    /// Interval currently used by the driver
    pub fn tick_interval(&self) -> Duration {
        *self.inner.interval_tx.borrow()
    }

    pub fn nominal_interval(&self) -> Duration {
        self.inner.config.tick_interval
    }

    pub fn state(&self) -> ManagerState {
        *self.inner.state.lock()
    }

    /// Logical time as stamped on the next chronon
    pub fn logical_now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    /// Logical time drift is measured against
    ///
    /// Runs ahead of [`ChrononManager::logical_now`] only while a backward
    /// correction is being absorbed.
    pub fn corrected_now(&self) -> Timestamp {
        self.inner.clock.target()
    }

    pub fn head_hash(&self) -> ChainHash {
        self.inner.chain.read().head_hash()
    }

    /// Register a callback fired with each new chronon number
    ///
    /// Callbacks run on the advancing task, in registration order, before
    /// the next advance may start.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.inner.subscribers.add(Arc::new(callback));
    }

    pub fn events(&self) -> broadcast::Receiver<ChrononEvent> {
        self.inner.events.subscribe()
    }

    pub fn vdf(&self) -> &Arc<VdfEngine> {
        &self.inner.vdf
    }

    pub fn config(&self) -> &ChrononConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for ChrononManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChrononManager")
            .field("state", &self.state())
            .field("current", &self.current_number())
            .field("tick_interval", &self.tick_interval())
            .finish()
    }
}

impl Inner {
    fn state(&self) -> ManagerState {
        *self.state.lock()
    }

    fn emit(&self, event: ChrononEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    async fn advance(&self) -> ChrononResult<AdvanceOutcome> {
        match self.state() {
            ManagerState::Uninitialized => return Err(ChrononError::NotInitialized),
            ManagerState::Stopped => return Err(ChrononError::Stopped),
            _ => {}
        }

        let Ok(_gate) = self.advance_gate.try_lock() else {
            debug!("Advance already in flight, coalescing");
            return Ok(AdvanceOutcome::Coalesced);
        };

        let (number, previous) = {
            let chain = self.chain.read();
            let current = chain
                .current()
                .ok_or(ChrononError::ChainCorrupt(0))?;
            (current.number, current.hash)
        };

        match self.seal(number, previous).await {
            Ok(chronon) => {
                let next = chronon.number;
                let hash = chronon.hash;
                self.metrics.lock().record_success(chronon.timestamp);

                debug!(
                    number = next,
                    hash = %hash,
                    computation_time_ms = chronon
                        .vdf_proof
                        .as_ref()
                        .map(|p| p.computation_time_ms)
                        .unwrap_or_default(),
                    "Chronon appended"
                );

                self.emit(ChrononEvent::Created { number: next, hash });
                self.subscribers.notify(next);
                self.emit(ChrononEvent::Tick(next));
                Ok(AdvanceOutcome::Advanced(next))
            }
            Err(ChrononError::Stopped) => Err(ChrononError::Stopped),
            Err(e) => {
                warn!("Failed to advance chronon {}: {}", number + 1, e);
                self.metrics.lock().record_failure(self.clock.now());
                self.emit(ChrononEvent::AdvanceFailed {
                    attempted: number + 1,
                    error: e.clone(),
                });
                Err(e)
            }
        }
    }

    /// Build and append the successor of `(number, previous)`
    async fn seal(&self, number: u64, previous: ChainHash) -> ChrononResult<Chronon> {
        let challenge = self.vdf.generate_challenge_at(None, self.clock.now());
        let proof = self.vdf.compute(&challenge).await?;

        let timestamp = self.clock.now();
        let chronon = Chronon::successor(&previous, number, timestamp, challenge, proof);

        let mut chain = self.chain.write();
        if self.state() == ManagerState::Stopped {
            return Err(ChrononError::Stopped);
        }
        chain.append(chronon.clone())?;
        Ok(chronon)
    }

    fn synchronize(self: &Arc<Self>, external: Timestamp) -> ChrononResult<()> {
        match self.state() {
            ManagerState::Uninitialized => return Err(ChrononError::NotInitialized),
            ManagerState::Stopped => return Err(ChrononError::Stopped),
            _ => {}
        }

        let internal = self.clock.target();
        let signed = external.signed_diff(internal);
        let deviation_ms = signed.unsigned_abs();

        self.metrics.lock().record_deviation(deviation_ms, internal);
        self.emit(ChrononEvent::Synchronized {
            deviation_ms,
            external,
            internal,
        });

        if deviation_ms as f64 > self.config.max_deviation_ms() {
            self.correct_drift(signed)?;
        } else {
            debug!(deviation_ms, "Clock within tolerance");
        }

        self.metrics.lock().record_success(internal);
        Ok(())
    }

    fn correct_drift(self: &Arc<Self>, signed_deviation_ms: i64) -> ChrononResult<()> {
        let handle = self
            .runtime
            .lock()
            .clone()
            .ok_or(ChrononError::NotInitialized)?;

        let nominal = self.config.tick_interval;
        let plan = plan_correction(nominal, signed_deviation_ms);

        let from = self.interval_tx.send_replace(plan.interval);
        self.clock.nudge(plan.clock_nudge_ms);

        info!(
            deviation_ms = plan.deviation_ms,
            external_ahead = plan.external_ahead,
            interval_ms = plan.interval.as_millis() as u64,
            "Correcting clock drift"
        );
        self.emit(ChrononEvent::IntervalAdjusted {
            from,
            to: plan.interval,
        });

        let weak = Arc::downgrade(self);
        let window = self.config.correction_window;
        let task = handle.spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(inner) = weak.upgrade() {
                inner.interval_tx.send_replace(nominal);
                info!(
                    interval_ms = nominal.as_millis() as u64,
                    "Tick interval restored"
                );
                inner.emit(ChrononEvent::IntervalRestored { interval: nominal });
            }
        });

        if let Some(previous) = self.restore.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }
}

fn driver_interval(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Periodic driver; exits once the manager is stopped or dropped
fn spawn_driver(inner: &Arc<Inner>, handle: &Handle) -> JoinHandle<()> {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let mut interval_rx = inner.interval_tx.subscribe();

    handle.spawn(async move {
        let mut ticker = driver_interval(*interval_rx.borrow_and_update());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(inner) = weak.upgrade() else { break };
                    if let Err(ChrononError::Stopped) = inner.advance().await {
                        break;
                    }
                }
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let period = *interval_rx.borrow_and_update();
                    debug!(interval_ms = period.as_millis() as u64, "Driver interval changed");
                    ticker = driver_interval(period);
                }
            }
        }

        debug!("Chronon driver stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronon_core::ManualClock;
    use chronon_vdf::{VdfAlgorithm, VdfConfig};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn manager(difficulty: u32, interval_ms: u64) -> ChrononManager {
        ChrononManager::new(interval_ms, VdfEngine::new(difficulty)).unwrap()
    }

    fn manual_manager(interval_ms: u64) -> (ChrononManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp(1_000_000)));
        let manager = ChrononManager::with_time_source(
            ChrononConfig::with_interval_ms(interval_ms),
            Arc::new(VdfEngine::new(2)),
            clock.clone(),
        )
        .unwrap();
        (manager, clock)
    }

    #[test]
    fn test_rejects_zero_interval() {
        let result = ChrononManager::new(0, VdfEngine::new(4));
        assert!(matches!(result, Err(ChrononError::InvalidConfig(_))));
    }

    #[test]
    fn test_uninitialized_accessors() {
        let m = manager(4, 1_000);
        assert_eq!(m.state(), ManagerState::Uninitialized);
        assert_eq!(m.current_number(), 0);
        assert!(m.chronon(0).is_none());
        assert!(m.recent(5).is_empty());
        assert!(!m.add_transaction(&b"early"[..]));
        assert!(!m.validate_chain());
        assert_eq!(
            m.require_chronon(0).unwrap_err(),
            ChrononError::ChrononNotFound(0)
        );
    }

    #[tokio::test]
    async fn test_genesis() {
        let m = manager(4, 1_000);
        m.initialize().await.unwrap();

        assert_eq!(m.state(), ManagerState::Running);
        assert_eq!(m.current_number(), 0);

        let genesis = m.chronon(0).unwrap();
        assert_eq!(genesis.previous_hash, ChainHash::ZERO);
        assert!(genesis.vdf_challenge.is_none());
        assert!(genesis.vdf_proof.is_none());
        assert_eq!(genesis.hash, crate::genesis_hash());
        assert!(m.validate_chain());

        m.shutdown();
    }

    #[tokio::test]
    async fn test_initialize_twice() {
        let m = manager(4, 1_000);
        m.initialize().await.unwrap();
        assert_eq!(
            m.initialize().await.unwrap_err(),
            ChrononError::AlreadyInitialized
        );
        m.shutdown();
    }

    #[tokio::test]
    async fn test_three_manual_advances() {
        let m = manager(4, 1_000);
        m.initialize().await.unwrap();

        for expected in 1..=3 {
            assert_eq!(m.advance().await.unwrap(), AdvanceOutcome::Advanced(expected));
        }

        assert_eq!(m.current_number(), 3);
        let numbers: Vec<u64> = m.recent(3).iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![3, 2, 1]);
        assert!(m.validate_chain());

        let verifier = VdfEngine::with_config(VdfConfig::untimed(4, VdfAlgorithm::Squaring));
        for n in 1..=3 {
            let c = m.chronon(n).unwrap();
            assert_eq!(c.previous_hash, m.chronon(n - 1).unwrap().hash);
            let challenge = c.vdf_challenge.as_ref().unwrap();
            let proof = c.vdf_proof.as_ref().unwrap();
            assert!(verifier.verify(challenge, proof).await);
        }

        m.shutdown();
    }

    #[tokio::test]
    async fn test_advance_before_initialize() {
        let m = manager(4, 1_000);
        assert_eq!(m.advance().await.unwrap_err(), ChrononError::NotInitialized);
    }

    #[tokio::test]
    async fn test_advance_after_shutdown() {
        let m = manager(4, 1_000);
        m.initialize().await.unwrap();
        m.shutdown();

        assert_eq!(m.state(), ManagerState::Stopped);
        assert_eq!(m.advance().await.unwrap_err(), ChrononError::Stopped);
        assert_eq!(m.current_number(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_idempotent() {
        let m = manager(4, 1_000);
        m.shutdown();
        m.shutdown();
        assert_eq!(m.state(), ManagerState::Stopped);
        assert_eq!(m.initialize().await.unwrap_err(), ChrononError::Stopped);

        let m = manager(4, 1_000);
        let mut events = m.events();
        m.initialize().await.unwrap();
        m.shutdown();
        m.shutdown();

        let mut shutdowns = 0;
        while let Ok(event) = events.try_recv() {
            if event == ChrononEvent::Shutdown {
                shutdowns += 1;
            }
        }
        assert_eq!(shutdowns, 1);
    }

    #[tokio::test]
    async fn test_transactions_freeze_on_advance() {
        let m = manager(4, 1_000);
        m.initialize().await.unwrap();

        assert!(m.add_transaction(&b"tx-a"[..]));
        assert!(m.add_transaction_to(0, &b"tx-b"[..]));
        m.advance().await.unwrap();

        assert!(!m.add_transaction_to(0, &b"tx-late"[..]));
        assert!(m.add_transaction(&b"tx-c"[..]));

        assert_eq!(m.transactions(0).len(), 2);
        assert_eq!(m.transactions(1), vec![Transaction::from_static(b"tx-c")]);
        assert!(m.transactions(9).is_empty());
        assert!(m.validate_chain());

        m.shutdown();
    }

    #[tokio::test]
    async fn test_subscribers_notified_in_order() {
        let m = manager(4, 1_000);
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for id in 0..2u64 {
            let log = log.clone();
            m.subscribe(move |n| log.lock().push((id, n)));
        }

        m.initialize().await.unwrap();
        m.advance().await.unwrap();
        m.advance().await.unwrap();

        assert_eq!(*log.lock(), vec![(0, 1), (1, 1), (0, 2), (1, 2)]);
        m.shutdown();
    }

    #[tokio::test]
    async fn test_subscriber_sees_appended_chronon() {
        let m = manager(4, 1_000);
        let seen = Arc::new(AtomicU64::new(u64::MAX));

        let observer = m.clone();
        let slot = seen.clone();
        m.subscribe(move |n| {
            if observer.chronon(n).is_some() {
                slot.store(n, Ordering::SeqCst);
            }
        });

        m.initialize().await.unwrap();
        m.advance().await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        m.shutdown();
    }

    #[tokio::test]
    async fn test_failed_advance_keeps_chain() {
        let vdf = VdfEngine::with_config(VdfConfig::untimed(4, VdfAlgorithm::Squaring));
        let m = ChrononManager::with_config(ChrononConfig::default(), Arc::new(vdf)).unwrap();
        let mut events = m.events();
        m.initialize().await.unwrap();

        m.vdf().set_difficulty(64);
        let err = m.advance().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(m.current_number(), 0);
        assert_eq!(m.state(), ManagerState::Running);

        let metrics = m.sync_metrics();
        assert_eq!(metrics.sync_failures, 1);
        assert_eq!(metrics.sync_attempts, 1);

        let failed = std::iter::from_fn(|| events.try_recv().ok())
            .any(|e| matches!(e, ChrononEvent::AdvanceFailed { attempted: 1, .. }));
        assert!(failed);

        m.vdf().set_difficulty(4);
        assert_eq!(m.advance().await.unwrap(), AdvanceOutcome::Advanced(1));
        m.shutdown();
    }

    #[tokio::test]
    async fn test_overlapping_advances_coalesce() {
        let m = manager(12, 60_000);
        m.initialize().await.unwrap();

        let (a, b) = tokio::join!(m.advance(), m.advance());
        let outcomes = [a.unwrap(), b.unwrap()];

        assert!(outcomes.contains(&AdvanceOutcome::Advanced(1)));
        assert!(outcomes.contains(&AdvanceOutcome::Coalesced));
        assert_eq!(m.current_number(), 1);
        m.shutdown();
    }

    #[tokio::test]
    async fn test_events_for_advance() {
        let m = manager(4, 60_000);
        let mut events = m.events();
        m.initialize().await.unwrap();
        m.advance().await.unwrap();

        let collected: Vec<ChrononEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert!(matches!(collected[0], ChrononEvent::Created { number: 0, .. }));
        assert!(matches!(collected[1], ChrononEvent::Created { number: 1, .. }));
        assert_eq!(collected[2], ChrononEvent::Tick(1));
        m.shutdown();
    }

    #[tokio::test]
    async fn test_synchronize_before_initialize() {
        let (m, _clock) = manual_manager(1_000);
        assert!(!m.synchronize(Timestamp(1_000_500)));

        let metrics = m.sync_metrics();
        assert_eq!(metrics.sync_attempts, 1);
        assert_eq!(metrics.sync_failures, 1);
    }

    #[tokio::test]
    async fn test_synchronize_within_tolerance() {
        let (m, _clock) = manual_manager(1_000);
        m.initialize().await.unwrap();

        assert!(m.synchronize(Timestamp(1_000_050)));
        assert_eq!(m.tick_interval(), Duration::from_millis(1_000));
        assert_eq!(m.sync_metrics().deviation_ms, 50);
        assert_eq!(m.logical_now(), Timestamp(1_000_000));
        m.shutdown();
    }

    #[tokio::test]
    async fn test_drift_converges() {
        let (m, _clock) = manual_manager(1_000);
        m.initialize().await.unwrap();

        let external = Timestamp(1_000_500);
        let before = external.signed_diff(m.logical_now()).unsigned_abs();
        assert!(m.synchronize(external));
        let after = external.signed_diff(m.logical_now()).unsigned_abs();

        assert!(after as f64 <= 0.6 * before as f64);
        assert_eq!(m.tick_interval(), Duration::from_millis(750));

        let metrics = m.sync_metrics();
        assert_eq!(metrics.deviation_ms, 500);
        assert_eq!(metrics.sync_successes, 1);
        assert_eq!(metrics.sync_attempts, 1);
        m.shutdown();
    }

    #[tokio::test]
    async fn test_external_behind_lengthens_interval() {
        let (m, _clock) = manual_manager(1_000);
        m.initialize().await.unwrap();

        assert!(m.synchronize(Timestamp(999_600)));
        assert_eq!(m.tick_interval(), Duration::from_millis(1_200));
        assert_eq!(m.corrected_now(), Timestamp(999_800));
        assert_eq!(m.logical_now(), Timestamp(1_000_000));
        m.shutdown();
    }

    #[tokio::test]
    async fn test_timestamps_monotonic_across_backward_sync() {
        let (m, clock) = manual_manager(1_000);
        m.initialize().await.unwrap();

        clock.advance(Duration::from_millis(1_000));
        m.advance().await.unwrap();
        let before = m.chronon(1).unwrap().timestamp;

        assert!(m.synchronize(Timestamp(990_000)));
        m.advance().await.unwrap();
        clock.advance(Duration::from_millis(1_000));
        m.advance().await.unwrap();

        let stamps: Vec<Timestamp> = m.range(0, 3).iter().map(|c| c.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "{stamps:?}");
        assert!(m.chronon(2).unwrap().timestamp >= before);
        assert!(m.statistics().average_block_time_ms >= 0.0);
        assert!(m.validate_chain());
        m.shutdown();
    }

    #[tokio::test]
    async fn test_challenge_uses_logical_time() {
        let (m, clock) = manual_manager(1_000);
        m.initialize().await.unwrap();
        clock.advance(Duration::from_millis(2_500));
        m.advance().await.unwrap();

        let chronon = m.chronon(1).unwrap();
        let challenge = chronon.vdf_challenge.unwrap();
        assert_eq!(challenge.timestamp, Timestamp(1_002_500));
        assert_eq!(chronon.timestamp, Timestamp(1_002_500));
        m.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_restored_after_window() {
        let (m, _clock) = manual_manager(1_000);
        m.initialize().await.unwrap();

        assert!(m.synchronize(Timestamp(1_000_400)));
        assert_eq!(m.tick_interval(), Duration::from_millis(800));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(m.tick_interval(), Duration::from_millis(800));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(m.tick_interval(), Duration::from_millis(1_000));
        m.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_correction_replaces_restore() {
        let (m, _clock) = manual_manager(1_000);
        m.initialize().await.unwrap();

        assert!(m.synchronize(Timestamp(1_000_400)));
        tokio::time::sleep(Duration::from_secs(40)).await;

        // Logical time is now 1_000_200
        assert!(m.synchronize(Timestamp(999_800)));
        assert_eq!(m.tick_interval(), Duration::from_millis(1_200));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(m.tick_interval(), Duration::from_millis(1_200));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(m.tick_interval(), Duration::from_millis(1_000));
        m.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_ticks() {
        let m = manager(2, 1_000);
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();
        m.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        m.initialize().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(m.current_number(), 3);
        assert!(m.validate_chain());

        m.shutdown();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(m.current_number(), 3);
    }

    #[tokio::test]
    async fn test_statistics() {
        let m = manager(4, 1_000);
        m.initialize().await.unwrap();
        for _ in 0..4 {
            m.advance().await.unwrap();
        }
        m.add_transaction(&b"a"[..]);
        m.add_transaction(&b"b"[..]);

        let stats = m.statistics();
        assert_eq!(stats.total_chronons, 5);
        assert!((stats.avg_transactions_per_chronon - 0.4).abs() < 1e-9);
        m.shutdown();
    }
}
