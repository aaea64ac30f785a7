// src/main.rs
use anyhow::Result;
use clap::Parser;
use pattern_screener::cli::{execute_command, Cli};
use pattern_screener::config::ScreenerConfig;
use pattern_screener::processor::StopSignal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = ScreenerConfig::load()?;

    // Ctrl-C asks the running scan to stop after the current ticker
    let stop = StopSignal::new();
    let on_interrupt = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Stop requested, saving progress");
                on_interrupt.request();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    execute_command(cli.command, &config, stop).await
}
