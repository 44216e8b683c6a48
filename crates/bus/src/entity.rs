//! Retained entity store.
//!
//! Registration messages are retained by the broker, so subscribing to the
//! registration filter replays every known entity. The cache folds those
//! messages into a `topic -> attributes` map.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::message::Message;
use crate::topic;

/// Registered entities keyed by topic.
pub type Entities = HashMap<String, Map<String, Value>>;

/// Entity store fed by registration messages.
pub struct EntityCache {
    filter: String,
    entities: RwLock<Entities>,
}

impl EntityCache {
    /// Create a cache accepting topics matching `filter`.
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Registration filter for a topic root (`te/+/+/+/+`).
    pub fn filter_for_root(root: &str) -> String {
        format!("{root}/+/+/+/+")
    }

    /// The MQTT filter this cache listens on.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Fold a message into the cache. Returns whether it was a registration.
    pub async fn apply(&self, message: &Message) -> bool {
        if !topic::matches(&self.filter, &message.topic) {
            return false;
        }

        if message.is_empty() {
            info!(topic = %message.topic, "Removing entity from store");
            self.entities.write().await.remove(&message.topic);
            return true;
        }

        match serde_json::from_slice::<Value>(&message.payload) {
            Ok(Value::Object(attributes)) => {
                debug!(topic = %message.topic, "Entity registered");
                self.entities
                    .write()
                    .await
                    .insert(message.topic.clone(), attributes);
                true
            }
            Ok(_) => {
                warn!(topic = %message.topic, "Registration message is not a JSON object");
                false
            }
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Could not parse registration message");
                false
            }
        }
    }

    /// Snapshot of the current entities.
    pub async fn snapshot(&self) -> Entities {
        self.entities.read().await.clone()
    }

    /// Number of known entities.
    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> EntityCache {
        EntityCache::new(EntityCache::filter_for_root("te"))
    }

    #[tokio::test]
    async fn registration_is_stored_and_cleared() {
        let cache = cache();
        let topic = "te/device/main/service/nginx";

        assert!(
            cache
                .apply(&Message::retained(
                    topic,
                    r#"{"@type":"service","type":"container"}"#
                ))
                .await
        );
        let snapshot = cache.snapshot().await;
        assert_eq!(
            snapshot.get(topic).and_then(|a| a.get("type")),
            Some(&Value::String("container".to_string()))
        );

        assert!(cache.apply(&Message::clear(topic)).await);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn non_registration_topics_are_ignored() {
        let cache = cache();
        let applied = cache
            .apply(&Message::retained(
                "te/device/main/service/nginx/status/health",
                r#"{"status":"up"}"#,
            ))
            .await;
        assert!(!applied);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn malformed_payloads_are_ignored() {
        let cache = cache();
        assert!(
            !cache
                .apply(&Message::retained("te/device/main/service/a", "not json"))
                .await
        );
        assert!(
            !cache
                .apply(&Message::retained("te/device/main/service/a", "[1,2]"))
                .await
        );
        assert!(cache.is_empty().await);
    }
}
