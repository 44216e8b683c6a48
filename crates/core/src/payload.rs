//! Message bodies published to the broker.
//!
//! Field names and shapes follow the thin-edge.io entity conventions and
//! must not change.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Health status of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Down,
    Unknown,
}

impl Status {
    /// Map a container engine state to a health status.
    pub fn from_engine_state(state: &str) -> Self {
        match state {
            "up" | "running" => Self::Up,
            "" => Self::Unknown,
            _ => Self::Down,
        }
    }

    /// Wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Entity registration body.
///
/// `{"@type":"service","name":"nginx","type":"container"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    #[serde(rename = "@type")]
    pub entity_type: String,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(rename = "@parent", default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl Registration {
    /// Registration of a service with the given service type.
    pub fn service(name: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            entity_type: "service".to_string(),
            name: name.into(),
            service_type: Some(service_type.into()),
            parent: None,
        }
    }

    /// Registration of the monitor itself, attached to its parent device.
    pub fn monitor(name: impl Into<String>, parent: impl Into<String>) -> Self {
        let parent = parent.into();
        Self {
            entity_type: "service".to_string(),
            name: name.into(),
            service_type: None,
            parent: (!parent.is_empty()).then_some(parent),
        }
    }
}

/// Health status body.
///
/// `{"status":"up","time":1700000000}`. The last-will variant omits `time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

impl HealthStatus {
    /// Status stamped with a unix timestamp in seconds.
    pub const fn at(status: Status, time: i64) -> Self {
        Self {
            status,
            time: Some(time),
        }
    }

    /// Status stamped with the current time.
    pub fn now(status: Status) -> Self {
        Self::at(status, chrono::Utc::now().timestamp())
    }

    /// Untimed `down` status used as the connection last will.
    pub const fn down() -> Self {
        Self {
            status: Status::Down,
            time: None,
        }
    }
}

/// Lightweight notification forwarded for a container engine event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventNotification {
    pub text: String,
    #[serde(rename = "containerID")]
    pub container_id: String,
    pub attributes: BTreeMap<String, String>,
}
