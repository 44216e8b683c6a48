//! In-memory container engine for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::debug;

use crate::engine::ContainerEngine;
use crate::error::{Error, Result};
use crate::event::{EngineEvent, EventStream};
use crate::filter::ServerFilter;
use crate::model::{ContainerSummary, StatsSnapshot};

/// In-memory engine.
///
/// Applies server filters like the Docker API does: a container is selected
/// when any name regex, id prefix or label selector matches.
#[derive(Default)]
pub struct InMemoryEngine {
    containers: RwLock<Vec<ContainerSummary>>,
    stats: RwLock<HashMap<String, StatsSnapshot>>,
    subscribers: RwLock<Vec<(mpsc::Sender<EngineEvent>, mpsc::Sender<Error>)>>,
    unavailable: AtomicBool,
    list_calls: RwLock<Vec<ServerFilter>>,
}

impl InMemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a container (matched by id).
    pub async fn upsert(&self, container: ContainerSummary) {
        let mut containers = self.containers.write().await;
        match containers.iter_mut().find(|c| c.id == container.id) {
            Some(existing) => *existing = container,
            None => containers.push(container),
        }
    }

    /// Remove a container by id.
    pub async fn remove(&self, id: &str) {
        self.containers.write().await.retain(|c| c.id != id);
    }

    /// Change the state of a container.
    pub async fn set_state(&self, id: &str, state: &str) {
        if let Some(container) = self
            .containers
            .write()
            .await
            .iter_mut()
            .find(|c| c.id == id)
        {
            container.state = state.to_string();
        }
    }

    /// Set the stats returned for a container.
    pub async fn set_stats(&self, id: &str, stats: StatsSnapshot) {
        self.stats.write().await.insert(id.to_string(), stats);
    }

    /// Make every call fail with `EngineUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Server filters of every list call, in order.
    pub async fn list_calls(&self) -> Vec<ServerFilter> {
        self.list_calls.read().await.clone()
    }

    /// Deliver an event to every subscriber.
    pub async fn emit(&self, event: EngineEvent) {
        for (events, _) in self.subscribers.read().await.iter() {
            let _ = events.send(event.clone()).await;
        }
    }

    /// Deliver an error to every subscriber.
    pub async fn emit_error(&self, reason: &str) {
        for (_, errors) in self.subscribers.read().await.iter() {
            let _ = errors.send(Error::unavailable(reason)).await;
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::unavailable("engine offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerEngine for InMemoryEngine {
    async fn list_containers(&self, filter: &ServerFilter) -> Result<Vec<ContainerSummary>> {
        self.check_available()?;
        self.list_calls.write().await.push(filter.clone());

        let containers = self.containers.read().await;
        if filter.is_empty() {
            return Ok(containers.clone());
        }

        let names: Vec<Regex> = filter
            .names
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect();

        Ok(containers
            .iter()
            .filter(|c| {
                let by_name = c.names.iter().any(|name| {
                    let bare = name.trim_start_matches('/');
                    names.iter().any(|re| re.is_match(name) || re.is_match(bare))
                });
                let by_id = filter.ids.iter().any(|id| c.id.starts_with(id.as_str()));
                let by_label = filter.labels.iter().any(|selector| match selector.split_once('=') {
                    Some((key, value)) => c.labels.get(key).is_some_and(|v| v == value),
                    None => c.labels.contains_key(selector),
                });
                by_name || by_id || by_label
            })
            .cloned()
            .collect())
    }

    async fn stats(&self, id: &str) -> Result<StatsSnapshot> {
        self.check_available()?;
        self.stats
            .read()
            .await
            .get(id)
            .copied()
            .ok_or_else(|| Error::not_found(id))
    }

    async fn events(&self, _stop: watch::Receiver<bool>) -> Result<EventStream> {
        self.check_available()?;
        let (event_tx, error_tx, stream) = EventStream::channel(16);
        self.subscribers.write().await.push((event_tx, error_tx));
        debug!("Event subscriber added");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EngineEventKind;
    use crate::filter::FilterCriteria;

    async fn engine() -> InMemoryEngine {
        let engine = InMemoryEngine::new();
        engine
            .upsert(ContainerSummary::new("aaa111", "web", "running").with_label("tier", "front"))
            .await;
        engine
            .upsert(ContainerSummary::new("bbb222", "db", "exited"))
            .await;
        engine
    }

    async fn ids(engine: &InMemoryEngine, filter: &ServerFilter) -> Vec<String> {
        engine
            .list_containers(filter)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.id)
            .collect()
    }

    #[tokio::test]
    async fn server_filters_are_ored() {
        let engine = engine().await;
        let filter = ServerFilter {
            names: vec!["^db$".to_string()],
            ids: vec!["aaa".to_string()],
            labels: Vec::new(),
        };
        assert_eq!(ids(&engine, &filter).await, vec!["aaa111", "bbb222"]);
    }

    #[tokio::test]
    async fn label_selectors_match_key_or_pair() {
        let engine = engine().await;
        let by_key = FilterCriteria {
            labels: vec!["tier".to_string()],
            ..FilterCriteria::default()
        };
        let by_pair = FilterCriteria {
            labels: vec!["tier=back".to_string()],
            ..FilterCriteria::default()
        };
        assert_eq!(ids(&engine, &by_key.server_filter()).await, vec!["aaa111"]);
        assert!(ids(&engine, &by_pair.server_filter()).await.is_empty());
    }

    #[tokio::test]
    async fn unavailable_engine_fails() {
        let engine = engine().await;
        engine.set_unavailable(true);
        assert!(matches!(
            engine.list_containers(&ServerFilter::default()).await,
            Err(Error::EngineUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let engine = engine().await;
        let (_stop_tx, stop_rx) = watch::channel(false);
        let stream = engine.events(stop_rx).await;
        assert!(stream.is_ok());
        let Ok(mut stream) = stream else { return };

        engine
            .emit(EngineEvent::new(EngineEventKind::Start, "aaa111"))
            .await;
        let received = stream.events.recv().await;
        assert_eq!(received.map(|e| e.kind), Some(EngineEventKind::Start));
    }
}
