//! Error types for the relay-server crate.

/// Errors that can occur in the relay server.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The HTTP server could not bind its address
    #[error("Failed to bind relay server: {0}")]
    Bind(String),

    /// An event could not be encoded for listeners
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An error occurred during shutdown
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

/// Type alias for results that can return a RelayError
pub type Result<T> = std::result::Result<T, RelayError>;
