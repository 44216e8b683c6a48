//! Error types for the cloud crate.

use thiserror::Error;

/// Result type alias for cloud operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Cloud error types.
#[derive(Debug, Error)]
pub enum Error {
    /// The request could not be sent or the proxy is unreachable.
    #[error("cloud request failed: {reason}")]
    Request { reason: String },

    /// The cloud answered with an unexpected status.
    #[error("cloud request '{path}' returned status {status}")]
    UnexpectedStatus { path: String, status: u16 },

    /// The response did not have the expected shape.
    #[error("invalid cloud response: {reason}")]
    InvalidResponse { reason: String },
}

impl Error {
    /// Create a request error.
    pub fn request(reason: impl Into<String>) -> Self {
        Self::Request {
            reason: reason.into(),
        }
    }

    /// Create an unexpected status error.
    pub fn unexpected_status(path: impl Into<String>, status: u16) -> Self {
        Self::UnexpectedStatus {
            path: path.into(),
            status,
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::request(e.to_string())
    }
}
