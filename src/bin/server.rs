//! choch-scanner server - headless market-structure scanner.
//!
//! Runs the scan orchestrator, the dashboard websocket broadcaster, and
//! (when trading is enabled) the order manager, until interrupted.
//!
//! # Usage
//! ```sh
//! cargo run --bin server
//! ```

use anyhow::Result;
use choch_scanner::application::orchestrator::OrchestratorCommand;
use choch_scanner::application::system::Application;
use choch_scanner::config::Config;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("choch-scanner {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(symbols = ?config.symbols, fetch_all_coins = config.fetch_all_coins, timeframes = ?config.timeframes, "configuration loaded");

    let app = Application::build(config).await?;
    let handle = app.start().await?;
    info!("scanner running, press Ctrl+C to stop");

    // `Application::start` already watches for Ctrl+C to tell the
    // orchestrator to stop; this just keeps the process alive until then.
    tokio::signal::ctrl_c().await?;
    let _ = handle.cmd_tx.send(OrchestratorCommand::Shutdown).await;
    info!("shutdown signal received, exiting");

    Ok(())
}
