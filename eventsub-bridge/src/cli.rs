use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LoggingMode;

/// EventSub Bridge
///
/// Keeps an EventSub websocket session alive for one channel and relays
/// follow, subscribe, cheer and raid alerts to local websocket listeners.
#[derive(Parser, Debug)]
#[command(name = "eventsub-bridge")]
#[command(about = "Relay Twitch EventSub alerts to local websocket listeners")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Load environment variables from this file instead of `.env`
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Relay server port (overrides PORT)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Credential file (overrides TOKEN_PATH)
    #[arg(long, global = true)]
    pub token_path: Option<PathBuf>,

    /// Log output mode (overrides EVENTSUB_LOG_MODE)
    #[arg(long, value_enum, global = true)]
    pub log_mode: Option<LoggingMode>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve listeners and relay alerts until stopped (default)
    Run,
    /// List the subscriptions the provider currently holds
    List,
    /// Delete every subscription the provider currently holds
    Cleanup,
    /// Print the authorization URL
    AuthUrl,
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}
