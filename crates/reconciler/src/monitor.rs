//! Container engine event monitor.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use twinmon_bus::{Message, PubSub};
use twinmon_core::Target;
use twinmon_engine::{ContainerEngine, EngineEvent, EngineEventKind, FilterCriteria};

use crate::error::Result;
use crate::worker::UpdateWorker;

/// What an engine event triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPolicy {
    /// Pass restricted to the event's container. Never removes entities.
    Targeted,
    /// Full pass, removing stale entities.
    Full,
    /// Logged only.
    LogOnly,
    /// Only forwarded as a notification.
    NotifyOnly,
    /// Dropped.
    Ignore,
}

impl EventPolicy {
    /// Whether the event leads to an update pass.
    pub const fn triggers_update(self) -> bool {
        matches!(self, Self::Targeted | Self::Full)
    }
}

/// Map an event kind to its policy.
pub fn policy(kind: &EngineEventKind) -> EventPolicy {
    match kind {
        EngineEventKind::Start
        | EngineEventKind::Stop
        | EngineEventKind::Pause
        | EngineEventKind::Unpause => EventPolicy::Targeted,
        EngineEventKind::Destroy | EngineEventKind::Remove => EventPolicy::Full,
        EngineEventKind::Create => EventPolicy::LogOnly,
        EngineEventKind::Die => EventPolicy::NotifyOnly,
        EngineEventKind::Unknown(_) => EventPolicy::Ignore,
    }
}

/// Turns engine events into update passes and notifications.
pub struct EventMonitor {
    engine: Arc<dyn ContainerEngine>,
    worker: Arc<UpdateWorker>,
    bus: Arc<dyn PubSub>,
    device: Target,
    forward_events: bool,
}

impl EventMonitor {
    /// Create a monitor.
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        worker: Arc<UpdateWorker>,
        bus: Arc<dyn PubSub>,
        device: Target,
        forward_events: bool,
    ) -> Self {
        Self {
            engine,
            worker,
            bus,
            device,
            forward_events,
        }
    }

    /// Consume engine events until `stop` turns true.
    ///
    /// Passes keep the client side exclusions of `criteria`.
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` if the event subscription cannot be opened.
    pub async fn run(&self, mut stop: watch::Receiver<bool>, criteria: FilterCriteria) -> Result<()> {
        let mut stream = self.engine.events(stop.clone()).await?;
        let mut errors_open = true;
        info!("Monitoring container engine events");

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                event = stream.events.recv() => match event {
                    Some(event) => {
                        self.handle_event(&event, &criteria).await;
                    }
                    None => {
                        warn!("Engine event stream closed");
                        break;
                    }
                },
                error = stream.errors.recv(), if errors_open => match error {
                    Some(e) => warn!(error = %e, "Engine event error"),
                    None => errors_open = false,
                },
            }
        }

        info!("Stopped monitoring container engine events");
        Ok(())
    }

    /// Apply the policy for one event.
    ///
    /// Returns the spawned update task, if the event triggers one.
    pub async fn handle_event(
        &self,
        event: &EngineEvent,
        criteria: &FilterCriteria,
    ) -> Option<JoinHandle<()>> {
        let policy = policy(&event.kind);
        debug!(action = %event.kind, id = %event.container_id, ?policy, "Engine event");

        if policy != EventPolicy::Ignore && self.forward_events {
            self.forward(event).await;
        }

        let criteria = match policy {
            EventPolicy::Targeted => criteria.with_ids([event.container_id.clone()]),
            EventPolicy::Full => criteria.client_side_only(),
            EventPolicy::LogOnly => {
                info!(action = %event.kind, id = %event.container_id, "Container event");
                return None;
            }
            EventPolicy::NotifyOnly | EventPolicy::Ignore => return None,
        };

        let worker = Arc::clone(&self.worker);
        let action = event.kind.to_string();
        Some(tokio::spawn(async move {
            match worker.update(criteria).await {
                Ok(summary) => {
                    debug!(action = %action, observed = summary.observed, "Event update finished");
                }
                Err(e) => warn!(action = %action, error = %e, "Event update failed"),
            }
        }))
    }

    async fn forward(&self, event: &EngineEvent) {
        let Some(notification) = event.notification() else {
            return;
        };
        let topic = self.device.event_topic(event.kind.as_str());
        let published = match Message::json(&topic, &notification) {
            Ok(message) => self.bus.publish(message).await,
            Err(e) => Err(e),
        };
        if let Err(e) = published {
            warn!(topic = %topic, error = %e, "Failed to forward engine event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_table() {
        assert_eq!(policy(&EngineEventKind::Start), EventPolicy::Targeted);
        assert_eq!(policy(&EngineEventKind::Stop), EventPolicy::Targeted);
        assert_eq!(policy(&EngineEventKind::Pause), EventPolicy::Targeted);
        assert_eq!(policy(&EngineEventKind::Unpause), EventPolicy::Targeted);
        assert_eq!(policy(&EngineEventKind::Destroy), EventPolicy::Full);
        assert_eq!(policy(&EngineEventKind::Remove), EventPolicy::Full);
        assert_eq!(policy(&EngineEventKind::Create), EventPolicy::LogOnly);
        assert_eq!(policy(&EngineEventKind::Die), EventPolicy::NotifyOnly);
        assert_eq!(
            policy(&EngineEventKind::parse("exec_start")),
            EventPolicy::Ignore
        );
    }

    #[test]
    fn test_only_targeted_and_full_trigger_updates() {
        assert!(EventPolicy::Targeted.triggers_update());
        assert!(EventPolicy::Full.triggers_update());
        assert!(!EventPolicy::NotifyOnly.triggers_update());
        assert!(!EventPolicy::LogOnly.triggers_update());
    }
}
