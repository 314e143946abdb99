//! Logging setup for the bridge binary.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LoggingMode {
    /// No output
    Silent,
    /// Compact stderr output
    Development,
    /// Verbose diagnostics with source locations
    Debug,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid log filter in {var}: {message}")]
    InvalidFilter { var: &'static str, message: String },
}

/// Initialize logging with the specified mode
///
/// # Environment Variables
///
/// - `EVENTSUB_LOG_LEVEL`: Override the filter (e.g. `debug` or `eventsub_stream=trace`)
/// - `RUST_LOG`: Used when `EVENTSUB_LOG_LEVEL` is not set
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr)
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Mode named by `EVENTSUB_LOG_MODE`, if set to a known value.
pub fn mode_from_env() -> Option<LoggingMode> {
    match std::env::var("EVENTSUB_LOG_MODE").ok()?.to_ascii_lowercase().as_str() {
        "silent" => Some(LoggingMode::Silent),
        "development" => Some(LoggingMode::Development),
        "debug" => Some(LoggingMode::Debug),
        _ => None,
    }
}

/// First try EVENTSUB_LOG_LEVEL, then RUST_LOG, then the mode's default level
fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    for var in ["EVENTSUB_LOG_LEVEL", "RUST_LOG"] {
        if let Ok(directives) = std::env::var(var) {
            return EnvFilter::try_new(&directives).map_err(|e| LoggingError::InvalidFilter {
                var,
                message: e.to_string(),
            });
        }
    }
    Ok(EnvFilter::new(default_level))
}
