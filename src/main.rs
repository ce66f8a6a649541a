//! Circles Indexer - binary entry point.
//!
//! Wires configuration from the environment and runs the sync state machine
//! until Ctrl-C.

use circles_indexer::{utils::logging, CirclesIndexer, CirclesIndexerConfigBuilder, Result};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    env_logger::init();

    let mut builder = CirclesIndexerConfigBuilder::new()
        .with_rpc(std::env::var("RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8545".to_string()))
        .with_database(
            std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/circles".to_string()),
        )
        .with_hub(std::env::var("HUB_ADDRESS")?);

    if let Ok(hub_v2) = std::env::var("HUB_V2_ADDRESS") {
        builder = builder.with_hub_v2(hub_v2);
    }
    if let Ok(start_block) = std::env::var("START_BLOCK") {
        let block = start_block.parse().map_err(|e| {
            circles_indexer::CirclesIndexerError::ConfigError(format!(
                "invalid START_BLOCK: {e}"
            ))
        })?;
        builder = builder.with_start_block(block);
    }

    let config = builder.build()?;

    logging::log_startup(
        &config.hub_address.to_string(),
        &config
            .hub_v2_address
            .map_or_else(|| "not configured".to_string(), |a| a.to_string()),
        &config.rpc_url,
        config.poll_interval_secs,
    );

    let indexer = CirclesIndexer::new(config).await?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            logging::log(logging::LogLevel::Warning, "shutdown requested");
            shutdown.cancel();
        }
    });

    indexer.start(cancel).await
}
