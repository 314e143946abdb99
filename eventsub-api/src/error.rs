//! Error types for the eventsub-api crate.

use eventsub_auth::AuthError;
use thiserror::Error;

/// Errors returned by subscription operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be sent or the response could not be read
    #[error("Network error: {0}")]
    Network(String),

    /// The provider rejected the credential, even after one refresh and retry
    #[error("{operation} unauthorized with status {status} after token refresh")]
    Unauthorized {
        operation: &'static str,
        status: u16,
    },

    /// The provider answered with a status the operation does not accept
    #[error("{operation} failed with status {status}: {body}")]
    UnexpectedStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The response body did not match the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Obtaining or refreshing the bearer credential failed
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
}

impl ApiError {
    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { status, .. } | ApiError::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            ApiError::Auth(AuthError::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ApiError::Parse(error.to_string())
        } else {
            ApiError::Network(error.to_string())
        }
    }
}

/// Type alias for results that can return an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;
