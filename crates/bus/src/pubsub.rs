//! Pub/sub trait and message routing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::entity::Entities;
use crate::error::Result;
use crate::message::Message;
use crate::topic;

/// Callback for routed messages. Must not block; spawn for async work.
pub type Handler = Arc<dyn Fn(Message) + Send + Sync>;

/// Broker operations consumed by the reconciler.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Snapshot of the registered entities.
    async fn entities(&self) -> Result<Entities>;

    /// Publish a message.
    async fn publish(&self, message: Message) -> Result<()>;

    /// Route incoming messages matching `filter` to `handler`.
    async fn add_route(&self, filter: &str, handler: Handler) -> Result<()>;

    /// Release the connection. A clean disconnect suppresses the last will.
    async fn disconnect(&self, clean: bool) -> Result<()>;
}

/// Filter based dispatch table.
#[derive(Default)]
pub struct Router {
    routes: RwLock<Vec<(String, Handler)>>,
}

impl Router {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler.
    pub async fn add(&self, filter: impl Into<String>, handler: Handler) {
        self.routes.write().await.push((filter.into(), handler));
    }

    /// Filters with at least one handler.
    pub async fn filters(&self) -> Vec<String> {
        self.routes
            .read()
            .await
            .iter()
            .map(|(filter, _)| filter.clone())
            .collect()
    }

    /// Deliver a message to every matching handler. Returns the match count.
    pub async fn dispatch(&self, message: &Message) -> usize {
        let handlers: Vec<Handler> = self
            .routes
            .read()
            .await
            .iter()
            .filter(|(filter, _)| topic::matches(filter, &message.topic))
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        if !handlers.is_empty() {
            debug!(topic = %message.topic, handlers = handlers.len(), "Routing message");
        }
        for handler in &handlers {
            handler(message.clone());
        }
        handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn dispatch_reaches_matching_handlers_only() {
        let router = Router::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        router
            .add(
                "te/+/+/service/+/cmd/health/check",
                Arc::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await;

        let matched = router
            .dispatch(&Message::new(
                "te/device/main/service/web/cmd/health/check",
                crate::QoS::AtLeastOnce,
                false,
                Vec::new(),
            ))
            .await;
        let unmatched = router
            .dispatch(&Message::retained("te/device/main/service/web", "{}"))
            .await;

        assert_eq!(matched, 1);
        assert_eq!(unmatched, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
