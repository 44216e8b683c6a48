//! Error types for the reconciler crate.

use std::fmt;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Broker unreachable or timed out. Aborts the pass.
    Transport { reason: String },
    /// Container engine unreachable. Aborts the pass.
    EngineUnavailable { reason: String },
    /// A single publish failed.
    PublishFailed { topic: String, reason: String },
    /// A cloud request failed.
    CloudRequest { reason: String },
    /// A topic could not be parsed into a target.
    InvalidTopicStructure { topic: String, reason: String },
    /// The update worker is no longer running.
    WorkerStopped,
    /// Invalid configuration.
    InvalidConfig { reason: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { reason } => write!(f, "transport error: {reason}"),
            Self::EngineUnavailable { reason } => {
                write!(f, "container engine unavailable: {reason}")
            }
            Self::PublishFailed { topic, reason } => {
                write!(f, "publish to '{topic}' failed: {reason}")
            }
            Self::CloudRequest { reason } => write!(f, "cloud request failed: {reason}"),
            Self::InvalidTopicStructure { topic, reason } => {
                write!(f, "invalid topic structure '{topic}': {reason}")
            }
            Self::WorkerStopped => write!(f, "update worker stopped"),
            Self::InvalidConfig { reason } => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Create a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create an engine unavailable error.
    pub fn engine_unavailable(reason: impl Into<String>) -> Self {
        Self::EngineUnavailable {
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

    /// Create a cloud request error.
    pub fn cloud_request(reason: impl Into<String>) -> Self {
        Self::CloudRequest {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether this error aborts a pass.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::EngineUnavailable { .. } | Self::WorkerStopped
        )
    }
}

impl From<twinmon_bus::Error> for Error {
    fn from(e: twinmon_bus::Error) -> Self {
        match e {
            twinmon_bus::Error::PublishFailed { topic, reason } => Self::PublishFailed { topic, reason },
            other => Self::transport(other.to_string()),
        }
    }
}

impl From<twinmon_engine::Error> for Error {
    fn from(e: twinmon_engine::Error) -> Self {
        match e {
            twinmon_engine::Error::EngineUnavailable { reason } => Self::EngineUnavailable { reason },
            other => Self::engine_unavailable(other.to_string()),
        }
    }
}

impl From<twinmon_cloud::Error> for Error {
    fn from(e: twinmon_cloud::Error) -> Self {
        Self::cloud_request(e.to_string())
    }
}

impl From<twinmon_core::Error> for Error {
    fn from(e: twinmon_core::Error) -> Self {
        match e {
            twinmon_core::Error::InvalidTopicStructure { topic, reason } => {
                Self::InvalidTopicStructure { topic, reason }
            }
            other => Self::invalid_config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::publish_failed("te/device/main/service/web", "timed out");
        assert_eq!(
            err.to_string(),
            "publish to 'te/device/main/service/web' failed: timed out"
        );
        assert_eq!(Error::WorkerStopped.to_string(), "update worker stopped");
    }

    #[test]
    fn test_bus_errors_map_to_transport_or_publish() {
        let publish: Error = twinmon_bus::Error::publish_failed("t", "x").into();
        assert!(matches!(publish, Error::PublishFailed { .. }));
        assert!(!publish.is_fatal());

        let transport: Error = twinmon_bus::Error::transport("down").into();
        assert!(matches!(transport, Error::Transport { .. }));
        assert!(transport.is_fatal());
    }

    #[test]
    fn test_engine_errors_are_unavailable() {
        let err: Error = twinmon_engine::Error::not_found("abc").into();
        assert!(matches!(err, Error::EngineUnavailable { .. }));
    }
}
