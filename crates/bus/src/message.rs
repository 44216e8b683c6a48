//! Messages exchanged with the broker.

use serde::Serialize;

use crate::error::Result;

/// MQTT quality of service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => Self::AtMostOnce,
            QoS::AtLeastOnce => Self::AtLeastOnce,
            QoS::ExactlyOnce => Self::ExactlyOnce,
        }
    }
}

impl From<rumqttc::QoS> for QoS {
    fn from(qos: rumqttc::QoS) -> Self {
        match qos {
            rumqttc::QoS::AtMostOnce => Self::AtMostOnce,
            rumqttc::QoS::AtLeastOnce => Self::AtLeastOnce,
            rumqttc::QoS::ExactlyOnce => Self::ExactlyOnce,
        }
    }
}

/// A single pub/sub message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub qos: QoS,
    pub retain: bool,
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a new message.
    pub fn new(
        topic: impl Into<String>,
        qos: QoS,
        retain: bool,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            qos,
            retain,
            payload: payload.into(),
        }
    }

    /// Retained QoS 1 message.
    pub fn retained(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(topic, QoS::AtLeastOnce, true, payload)
    }

    /// Retained QoS 1 message with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the value cannot be encoded.
    pub fn retained_json<T: Serialize>(topic: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self::retained(topic, serde_json::to_vec(value)?))
    }

    /// Non-retained QoS 1 message with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the value cannot be encoded.
    pub fn json<T: Serialize>(topic: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self::new(
            topic,
            QoS::AtLeastOnce,
            false,
            serde_json::to_vec(value)?,
        ))
    }

    /// Empty retained message, which clears the retained value on the topic.
    pub fn clear(topic: impl Into<String>) -> Self {
        Self::retained(topic, Vec::new())
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Payload as UTF-8 text (lossy).
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_clear_is_empty_retained() {
        let msg = Message::clear("te/device/main/service/a");
        assert!(msg.retain);
        assert!(msg.is_empty());
        assert_eq!(msg.qos, QoS::AtLeastOnce);
    }

    #[test]
    fn test_json_event_is_not_retained() {
        let msg = Message::json("te/device/main///e/start", &serde_json::json!({"a": 1})).unwrap();
        assert!(!msg.retain);
        assert_eq!(msg.payload_str(), r#"{"a":1}"#);
    }
}
