//! Chronon Node - runtime loop around one manager

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chronon_core::{ChrononError, ChrononResult, SystemClock, TimeSource, Timestamp};
use chronon_time::{ChrononConfig, ChrononManager, ChrononStatistics, SynchronizationMetrics};
use chronon_vdf::{VdfConfig, VdfEngine};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::LogFormat;

/// Default period between synchronizations
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Chronon Node configuration
#[derive(Clone, Debug, PartialEq)]
pub struct NodeConfig {
    pub chronon: ChrononConfig,
    pub vdf: VdfConfig,
    /// Period between synchronizations; `None` disables them
    pub sync_interval: Option<Duration>,
    /// Run the VDF self-test before initializing
    pub self_test: bool,
    pub log_format: LogFormat,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            chronon: ChrononConfig::default(),
            vdf: VdfConfig::default(),
            sync_interval: Some(DEFAULT_SYNC_INTERVAL),
            self_test: true,
            log_format: LogFormat::default(),
        }
    }
}

impl NodeConfig {
    /// Read every `CHRONON_*` knob plus `CHRONON_LOG_FORMAT`
    pub fn from_env() -> ChrononResult<Self> {
        let mut config = NodeConfig {
            chronon: ChrononConfig::from_env()?,
            vdf: VdfConfig::from_env()?,
            ..Default::default()
        };

        if let Ok(raw) = std::env::var("CHRONON_SYNC_INTERVAL_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                ChrononError::InvalidConfig(format!("CHRONON_SYNC_INTERVAL_MS: {raw:?}"))
            })?;
            config.sync_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Ok(raw) = std::env::var("CHRONON_LOG_FORMAT") {
            config.log_format = raw.parse()?;
        }

        Ok(config)
    }

    /// Small, fast node for tests and demos
    pub fn lightweight() -> Self {
        NodeConfig {
            chronon: ChrononConfig::with_interval_ms(100),
            vdf: VdfConfig::untimed(4, Default::default()),
            sync_interval: Some(Duration::from_secs(1)),
            self_test: true,
            log_format: LogFormat::Pretty,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub ticks: u64,
    pub syncs: u64,
    pub failed_syncs: u64,
    pub last_tick: u64,
}

/// Snapshot logged on shutdown
#[derive(Clone, Debug, Serialize)]
pub struct NodeStatus {
    pub state: String,
    pub current: u64,
    pub tick_interval_ms: u64,
    pub chain_valid: bool,
    pub runtime: RuntimeStats,
    pub sync: SynchronizationMetrics,
    pub statistics: ChrononStatistics,
}

/// Chronon Node
pub struct Node {
    config: NodeConfig,
    manager: ChrononManager,
    reference: Arc<dyn TimeSource>,
    stats: Arc<Mutex<RuntimeStats>>,
}

impl Node {
    /// Node synchronizing against the system clock
    pub fn new(config: NodeConfig) -> ChrononResult<Self> {
        Self::with_reference(config, Arc::new(SystemClock))
    }

    /// Node synchronizing against `reference`
    pub fn with_reference(
        config: NodeConfig,
        reference: Arc<dyn TimeSource>,
    ) -> ChrononResult<Self> {
        let vdf = Arc::new(VdfEngine::with_config(config.vdf.clone()));
        let manager = ChrononManager::with_config(config.chronon.clone(), vdf)?;
        Ok(Self::from_parts(config, manager, reference))
    }

    /// Node around an existing manager
    pub fn from_parts(
        config: NodeConfig,
        manager: ChrononManager,
        reference: Arc<dyn TimeSource>,
    ) -> Self {
        Node {
            config,
            manager,
            reference,
            stats: Arc::new(Mutex::new(RuntimeStats::default())),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn manager(&self) -> &ChrononManager {
        &self.manager
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats.lock().clone()
    }

    /// Self-test, subscribe the tick logger and initialize the manager
    pub async fn start(&self) -> ChrononResult<()> {
        if self.config.self_test {
            self.manager.vdf().self_test().await?;
            debug!("VDF self-test passed");
        }

        let stats = self.stats.clone();
        self.manager.subscribe(move |number| {
            let mut stats = stats.lock();
            stats.ticks += 1;
            stats.last_tick = number;
            debug!(chronon = number, "Tick");
        });

        self.manager.initialize().await?;
        info!(
            sync_interval_ms = self.config.sync_interval.map(|d| d.as_millis() as u64),
            "Chronon node started"
        );
        Ok(())
    }

    /// Synchronize once against the reference clock
    pub fn sync_once(&self) -> bool {
        let external: Timestamp = self.reference.now();
        let ok = self.manager.synchronize(external);

        let mut stats = self.stats.lock();
        stats.syncs += 1;
        if !ok {
            stats.failed_syncs += 1;
        }
        ok
    }

    /// Start, then synchronize periodically until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> ChrononResult<NodeStatus>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        tokio::pin!(shutdown);

        match self.config.sync_interval {
            Some(period) => {
                let mut ticker =
                    tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if !self.sync_once() {
                                warn!("Periodic synchronization failed");
                            }
                        }
                        _ = &mut shutdown => break,
                    }
                }
            }
            None => shutdown.await,
        }

        self.manager.shutdown();
        let status = self.status();
        match serde_json::to_string(&status) {
            Ok(json) => info!(status = %json, "Chronon node stopped"),
            Err(e) => warn!("Could not encode node status: {}", e),
        }
        Ok(status)
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            state: format!("{:?}", self.manager.state()),
            current: self.manager.current_number(),
            tick_interval_ms: self.manager.tick_interval().as_millis() as u64,
            chain_valid: self.manager.validate_chain(),
            runtime: self.stats(),
            sync: self.manager.sync_metrics(),
            statistics: self.manager.statistics(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronon_core::ManualClock;
    use chronon_time::ManagerState;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.sync_interval, Some(DEFAULT_SYNC_INTERVAL));
        assert_eq!(config.chronon.tick_interval, Duration::from_millis(1_000));
        assert_eq!(config.vdf.difficulty, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_ticks_and_stops() {
        let node = Node::new(NodeConfig::lightweight()).unwrap();

        let status = node
            .run_until(tokio::time::sleep(Duration::from_millis(550)))
            .await
            .unwrap();

        assert_eq!(status.state, "Stopped");
        assert_eq!(status.current, 5);
        assert!(status.chain_valid);
        assert_eq!(status.runtime.ticks, 5);
        assert_eq!(status.runtime.last_tick, 5);
        assert_eq!(node.manager().state(), ManagerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sync_corrects_drift() {
        let reference = Arc::new(ManualClock::new(Timestamp::now()));
        reference.advance(Duration::from_secs(3_600));

        let node = Node::with_reference(NodeConfig::lightweight(), reference).unwrap();
        let status = node
            .run_until(tokio::time::sleep(Duration::from_millis(1_500)))
            .await
            .unwrap();

        assert_eq!(status.runtime.syncs, 1);
        assert_eq!(status.runtime.failed_syncs, 0);
        assert!(status.sync.deviation_ms >= 3_500_000);
        assert_eq!(status.tick_interval_ms, 1);
    }

    #[tokio::test]
    async fn test_sync_before_start_fails() {
        let node = Node::new(NodeConfig::lightweight()).unwrap();
        assert!(!node.sync_once());
        assert_eq!(node.stats().failed_syncs, 1);
    }
}
