use anyhow::{Result, Context};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

mod alert;
mod api;
mod browser;
mod classify;
mod config;
mod engine;
mod fetch;
mod models;
mod storage;

use crate::config::MonitorConfig;
use crate::engine::Monitor;
use crate::storage::StatusLog;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let config_path = "config.json";
    let config_content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path))?;
    let mut config: MonitorConfig = serde_json::from_str(&config_content)
        .with_context(|| "Failed to parse config")?;
    config.checker.apply_env();

    let api_port = config.api_port;
    let monitor = Arc::new(Monitor::new(config.clone())?);

    let api_ctx = Arc::new(api::ApiContext {
        state: monitor.state.clone(),
        history: StatusLog::new(&config.logs_dir),
    });
    tokio::spawn(async move {
        api::start_server(api_port, api_ctx).await;
    });

    let engine = Arc::clone(&monitor);
    tokio::spawn(async move {
        if let Err(e) = engine.run().await {
            tracing::error!("Monitor engine failed: {}", e);
        }
    });

    signal::ctrl_c().await?;
    info!("Shutdown signal received. Closing RTI Pulse...");
    monitor.shutdown().await;

    Ok(())
}
