//! `chronond` - run a Chronon node until interrupted

use chronon_core::ChrononResult;
use chronon_runtime::{init_logging, LogFormat, Node, NodeConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("chronond failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> ChrononResult<()> {
    let config = match NodeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Logging is not up yet
            let _ = init_logging(LogFormat::default());
            return Err(e);
        }
    };
    init_logging(config.log_format)?;

    info!(
        tick_interval_ms = config.chronon.tick_interval.as_millis() as u64,
        difficulty = config.vdf.difficulty,
        algorithm = %config.vdf.algorithm,
        "Starting chronond"
    );

    let node = Node::new(config)?;
    let status = node
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await?;

    info!(
        chronons = status.current + 1,
        chain_valid = status.chain_valid,
        "Goodbye"
    );
    Ok(())
}
