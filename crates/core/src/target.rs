//! thin-edge.io topic identities.
//!
//! A [`Target`] is a root prefix (`te`) plus a four segment topic id
//! (`device/main//`, `device/main/service/nginx`). Every topic the monitor
//! publishes to is derived from one.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of `/` separated segments in a topic id.
const TOPIC_ID_SEGMENTS: usize = 4;

/// A thin-edge.io entity address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Root prefix, usually `te`.
    pub root_prefix: String,
    /// Four segment topic id, e.g. `device/main//`.
    pub topic_id: String,
    /// External id of the owning device in the cloud. Empty when unknown.
    pub cloud_identity: String,
}

impl Target {
    /// Create a new target.
    pub fn new(
        root_prefix: impl Into<String>,
        topic_id: impl Into<String>,
        cloud_identity: impl Into<String>,
    ) -> Self {
        Self {
            root_prefix: root_prefix.into(),
            topic_id: topic_id.into(),
            cloud_identity: cloud_identity.into(),
        }
    }

    /// Parse a full entity topic (`<root>/<a>/<b>/<c>/<d>`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidTopicStructure` if the topic does not have exactly
    /// five segments or the root prefix is empty.
    pub fn from_topic(topic: &str) -> Result<Self> {
        let parts = topic.split('/').collect_vec();
        if parts.len() != TOPIC_ID_SEGMENTS + 1 {
            return Err(Error::invalid_topic(
                topic,
                format!(
                    "expected {} segments, found {}",
                    TOPIC_ID_SEGMENTS + 1,
                    parts.len()
                ),
            ));
        }

        let (root, rest) = parts
            .split_first()
            .ok_or_else(|| Error::invalid_topic(topic, "empty topic"))?;
        if root.is_empty() {
            return Err(Error::invalid_topic(topic, "empty root prefix"));
        }

        Ok(Self::new(*root, rest.join("/"), String::new()))
    }

    /// Whether a topic id has the expected four segments.
    pub fn is_valid_topic_id(topic_id: &str) -> bool {
        topic_id.split('/').count() == TOPIC_ID_SEGMENTS
    }

    /// Full entity topic.
    pub fn topic(&self) -> String {
        format!("{}/{}", self.root_prefix, self.topic_id)
    }

    /// A service owned by the same device.
    pub fn service(&self, name: &str) -> Self {
        let mut parts = self.topic_id.split('/');
        let kind = parts.next().unwrap_or_default();
        let id = parts.next().unwrap_or_default();

        Self {
            root_prefix: self.root_prefix.clone(),
            topic_id: format!("{kind}/{id}/service/{name}"),
            cloud_identity: self.cloud_identity.clone(),
        }
    }

    /// Return a copy with the given cloud identity.
    #[must_use]
    pub fn with_cloud_identity(mut self, cloud_identity: impl Into<String>) -> Self {
        self.cloud_identity = cloud_identity.into();
        self
    }

    /// Cloud external id, or `None` if the cloud identity is unknown.
    ///
    /// `dev01` + `device/main/service/nginx` gives
    /// `dev01:device:main:service:nginx`.
    pub fn external_id(&self) -> Option<String> {
        if self.cloud_identity.is_empty() {
            return None;
        }
        let suffix = self.topic_id.trim_end_matches('/').replace('/', ":");
        Some(format!("{}:{suffix}", self.cloud_identity))
    }

    /// Topic carrying the entity's health status.
    pub fn health_topic(&self) -> String {
        self.subtopic(&["status", "health"])
    }

    /// Topic carrying the container twin fragment.
    pub fn twin_topic(&self) -> String {
        self.subtopic(&["twin", "container"])
    }

    /// Topic for an engine event notification.
    pub fn event_topic(&self, action: &str) -> String {
        self.subtopic(&["e", action])
    }

    /// Topic on which on-demand health checks are requested.
    pub fn command_topic(&self) -> String {
        self.subtopic(&["cmd", "health", "check"])
    }

    fn subtopic(&self, parts: &[&str]) -> String {
        format!("{}/{}", self.topic(), parts.join("/"))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.topic())
    }
}
