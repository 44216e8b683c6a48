//! Error types for the engine crate.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine could not be reached or returned garbage.
    #[error("container engine unavailable: {reason}")]
    EngineUnavailable { reason: String },

    /// The engine answered with a non-success status.
    #[error("engine request '{path}' failed with status {status}: {body}")]
    RequestFailed {
        path: String,
        status: u16,
        body: String,
    },

    /// No container matched.
    #[error("container not found: {id}")]
    NotFound { id: String },

    /// Response body could not be decoded.
    #[error("could not decode engine response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl Error {
    /// Create an engine unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::EngineUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a request failed error.
    pub fn request_failed(path: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::RequestFailed {
            path: path.into(),
            status,
            body: body.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::unavailable("connection refused").to_string(),
            "container engine unavailable: connection refused"
        );
        assert_eq!(
            Error::request_failed("/containers/json", 500, "boom").to_string(),
            "engine request '/containers/json' failed with status 500: boom"
        );
    }
}
