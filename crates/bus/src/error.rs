//! Error types for the bus crate.

use thiserror::Error;

/// Result type alias for bus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Bus error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Broker unreachable or request timed out.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// A single publish failed.
    #[error("publish to '{topic}' failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// Subscribing to a filter failed.
    #[error("subscribe to '{filter}' failed: {reason}")]
    SubscribeFailed { filter: String, reason: String },

    /// Payload could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a publish failed error.
    pub fn publish_failed(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PublishFailed {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    /// Create a subscribe failed error.
    pub fn subscribe_failed(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubscribeFailed {
            filter: filter.into(),
            reason: reason.into(),
        }
    }
}
