//! Container lifecycle events.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use tokio::sync::mpsc;
use twinmon_core::EventNotification;

use crate::error::Error;

/// Lifecycle action reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EngineEventKind {
    Create,
    Start,
    Stop,
    Die,
    Pause,
    Unpause,
    Destroy,
    Remove,
    Unknown(String),
}

impl EngineEventKind {
    /// Parse an engine action name.
    pub fn parse(action: &str) -> Self {
        match action {
            "create" => Self::Create,
            "start" => Self::Start,
            "stop" => Self::Stop,
            "die" => Self::Die,
            "pause" => Self::Pause,
            "unpause" => Self::Unpause,
            "destroy" => Self::Destroy,
            "remove" => Self::Remove,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Engine action name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Die => "die",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
            Self::Destroy => "destroy",
            Self::Remove => "remove",
            Self::Unknown(action) => action,
        }
    }

    /// Verb used in notifications, `None` for unmapped actions.
    pub const fn verb(&self) -> Option<&'static str> {
        match self {
            Self::Create => Some("created"),
            Self::Start => Some("started"),
            Self::Stop => Some("stopped"),
            Self::Die => Some("died"),
            Self::Pause => Some("paused"),
            Self::Unpause => Some("unpaused"),
            Self::Destroy => Some("destroyed"),
            Self::Remove => Some("removed"),
            Self::Unknown(_) => None,
        }
    }
}

impl fmt::Display for EngineEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A container lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub kind: EngineEventKind,
    pub container_id: String,
    pub attributes: BTreeMap<String, String>,
}

impl EngineEvent {
    /// Create an event without attributes.
    pub fn new(kind: EngineEventKind, container_id: impl Into<String>) -> Self {
        Self {
            kind,
            container_id: container_id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an actor attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Decode one line of the engine event stream.
    ///
    /// Returns `Ok(None)` for events about anything other than containers.
    ///
    /// # Errors
    ///
    /// Returns `Decode` if the line is not a valid event message.
    pub fn from_json(line: &[u8]) -> Result<Option<Self>, Error> {
        let message: EventMessage = serde_json::from_slice(line)?;
        if message.kind != "container" {
            return Ok(None);
        }
        Ok(Some(Self {
            kind: EngineEventKind::parse(&message.action),
            container_id: message.actor.id,
            attributes: message.actor.attributes,
        }))
    }

    /// Notification body for mapped actions.
    pub fn notification(&self) -> Option<EventNotification> {
        self.kind.verb().map(|verb| EventNotification {
            text: format!("container {verb}"),
            container_id: self.container_id.clone(),
            attributes: self.attributes.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(rename = "Actor", default)]
    actor: Actor,
}

#[derive(Debug, Default, Deserialize)]
struct Actor {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Attributes", default)]
    attributes: BTreeMap<String, String>,
}

/// Event and error channels of one subscription.
pub struct EventStream {
    pub events: mpsc::Receiver<EngineEvent>,
    pub errors: mpsc::Receiver<Error>,
}

impl EventStream {
    /// Create a stream and the senders feeding it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<EngineEvent>, mpsc::Sender<Error>, Self) {
        let (event_tx, events) = mpsc::channel(capacity);
        let (error_tx, errors) = mpsc::channel(capacity);
        (event_tx, error_tx, Self { events, errors })
    }
}
