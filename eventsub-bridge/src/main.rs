use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

mod app;
mod cli;
mod config;
mod logging;
mod shutdown;

use cli::{Args, Command};
use config::BridgeConfig;
use logging::{init_logging, mode_from_env, LoggingMode};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = BridgeConfig::from_env(args.env_file.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(path) = &args.token_path {
        config = config.with_token_path(path);
    }

    let mode = args
        .log_mode
        .or_else(mode_from_env)
        .unwrap_or(LoggingMode::Development);
    init_logging(mode).context("Failed to initialize logging")?;

    let command = args.command();
    info!(?command, port = config.port, events = ?config.event_kinds, "Starting eventsub-bridge");
    tracing::debug!(?config, "Loaded configuration");

    let result = match command {
        Command::Run => app::run(config).await,
        Command::List => app::list(config).await,
        Command::Cleanup => app::cleanup(config).await,
        Command::AuthUrl => app::auth_url(config),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
