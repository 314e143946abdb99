//! Error types for the eventsub-stream crate.

use eventsub_api::ApiError;
use std::time::Duration;

/// Errors that can occur while running an EventSub session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The websocket could not be opened, read or written
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider sent a message that is missing a required field or is not valid JSON
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No welcome message arrived after connecting
    #[error("No welcome message within {0:?}")]
    WelcomeTimeout(Duration),

    /// A subscription REST call failed
    #[error("Subscription API error: {0}")]
    Api(#[from] ApiError),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SessionError {
    /// Whether the error disables the session manager instead of triggering a reconnect.
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::Configuration(_) => true,
            SessionError::Api(ApiError::Auth(auth)) => auth.is_configuration(),
            _ => false,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SessionError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        SessionError::Transport(error.to_string())
    }
}

/// Type alias for results that can return a SessionError
pub type Result<T> = std::result::Result<T, SessionError>;
