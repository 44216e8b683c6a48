//! Core types for twinmon.
//!
//! Holds the pieces shared by every other crate in the workspace:
//!
//! - [`Target`]: thin-edge.io topic identities and the topics derived from them
//! - [`payload`]: the exact JSON bodies published to the broker
//! - [`Settings`]: layered configuration (defaults, file, environment)
//! - [`Error`]: typed errors for the above

pub mod config;
pub mod error;
pub mod payload;
pub mod target;

pub use config::{
    CloudSettings, DeletionSettings, EngineSettings, FilterSettings, MetricsSettings,
    MonitorSettings, MqttSettings, Settings, Toggle, expand_list,
};
pub use error::{Error, Result};
pub use payload::{EventNotification, HealthStatus, Registration, Status};
pub use target::Target;

/// Entity type for a single container.
pub const CONTAINER_TYPE: &str = "container";

/// Entity type for a compose project member.
pub const CONTAINER_GROUP_TYPE: &str = "container-group";
