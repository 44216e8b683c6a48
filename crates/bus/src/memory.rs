//! In-memory broker for testing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::entity::{Entities, EntityCache};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::pubsub::{Handler, PubSub, Router};
use crate::topic;

/// In-memory broker.
///
/// Keeps retained messages, a log of every publish in order, and the entity
/// cache. Registrations become visible to `entities()` immediately.
pub struct InMemoryBroker {
    cache: EntityCache,
    router: Router,
    retained: RwLock<BTreeMap<String, Message>>,
    log: RwLock<Vec<Message>>,
    failing: RwLock<Vec<String>>,
    unreachable: AtomicBool,
    disconnected: RwLock<Option<bool>>,
}

impl InMemoryBroker {
    /// Create a broker whose entity store covers the `te` root.
    pub fn new() -> Self {
        Self::with_root("te")
    }

    /// Create a broker whose entity store covers the given root.
    pub fn with_root(root: &str) -> Self {
        Self {
            cache: EntityCache::new(EntityCache::filter_for_root(root)),
            router: Router::new(),
            retained: RwLock::new(BTreeMap::new()),
            log: RwLock::new(Vec::new()),
            failing: RwLock::new(Vec::new()),
            unreachable: AtomicBool::new(false),
            disconnected: RwLock::new(None),
        }
    }

    /// Retain a registration without recording it in the publish log.
    pub async fn seed(&self, topic: &str, payload: serde_json::Value) {
        let message = Message::retained(topic, payload.to_string());
        self.cache.apply(&message).await;
        self.retained
            .write()
            .await
            .insert(topic.to_string(), message);
    }

    /// Make every publish to a topic matching `filter` fail.
    pub async fn fail_publishes_matching(&self, filter: &str) {
        self.failing.write().await.push(filter.to_string());
    }

    /// Stop injecting publish failures.
    pub async fn clear_failures(&self) {
        self.failing.write().await.clear();
    }

    /// Make `entities()` fail with a transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Every successful publish, in order.
    pub async fn published(&self) -> Vec<Message> {
        self.log.read().await.clone()
    }

    /// Successful publishes to one topic, in order.
    pub async fn published_to(&self, topic: &str) -> Vec<Message> {
        self.log
            .read()
            .await
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Forget the publish log, keeping retained state.
    pub async fn clear_log(&self) {
        self.log.write().await.clear();
    }

    /// Current retained message on a topic.
    pub async fn retained(&self, topic: &str) -> Option<Message> {
        self.retained.read().await.get(topic).cloned()
    }

    /// `Some(clean)` once `disconnect` was called.
    pub async fn disconnected(&self) -> Option<bool> {
        *self.disconnected.read().await
    }

    /// Deliver an incoming message to the routes, as if another client sent it.
    pub async fn inject(&self, message: Message) -> usize {
        self.router.dispatch(&message).await
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSub for InMemoryBroker {
    async fn entities(&self) -> Result<Entities> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::transport("broker unreachable"));
        }
        Ok(self.cache.snapshot().await)
    }

    async fn publish(&self, message: Message) -> Result<()> {
        let injected = self
            .failing
            .read()
            .await
            .iter()
            .any(|filter| topic::matches(filter, &message.topic));
        if injected {
            return Err(Error::publish_failed(&message.topic, "injected failure"));
        }

        self.log.write().await.push(message.clone());

        if message.retain {
            let mut retained = self.retained.write().await;
            if message.is_empty() {
                retained.remove(&message.topic);
            } else {
                retained.insert(message.topic.clone(), message.clone());
            }
        }

        self.cache.apply(&message).await;
        self.router.dispatch(&message).await;
        Ok(())
    }

    async fn add_route(&self, filter: &str, handler: Handler) -> Result<()> {
        self.router.add(filter, handler).await;
        Ok(())
    }

    async fn disconnect(&self, clean: bool) -> Result<()> {
        *self.disconnected.write().await = Some(clean);
        Ok(())
    }
}
