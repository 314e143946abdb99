//! Error types for the eventsub-auth crate.

/// Errors that can occur while loading, refreshing or persisting credentials.
///
/// The type is `Clone` so a single failed refresh can be handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// Required configuration is missing (client id/secret, credential file, refresh token)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The OAuth endpoint could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// The OAuth endpoint answered with a non-success status
    #[error("Token endpoint rejected the request with status {status}: {body}")]
    Rejected {
        /// HTTP status code returned by the provider
        status: u16,
        /// Raw response body, kept for diagnostics
        body: String,
    },

    /// The OAuth endpoint returned a body that could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Reading or writing the credential file failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// True for errors caused by missing configuration rather than a failed call.
    pub fn is_configuration(&self) -> bool {
        matches!(self, AuthError::Configuration(_))
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            AuthError::Parse(error.to_string())
        } else {
            AuthError::Network(error.to_string())
        }
    }
}

/// Convenience type alias for Results using AuthError.
pub type Result<T> = std::result::Result<T, AuthError>;
