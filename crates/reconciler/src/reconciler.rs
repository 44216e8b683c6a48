//! Reconciler implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use itertools::Itertools;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use twinmon_bus::{Entities, PubSub, topic};
use twinmon_core::{CONTAINER_GROUP_TYPE, CONTAINER_TYPE, Target};
use twinmon_engine::{FilterCriteria, InventoryLister, ObservedItem};

use crate::error::{Error, Result};
use crate::gate::GateHandle;
use crate::types::{PassSummary, PlannedItem, ReconcileAction, ReconcileDelta, StaleEntity};

/// Configuration for the reconciler.
#[derive(Debug, Clone, Default)]
pub struct ReconcilerConfig {
    /// Whether to read container stats on each pass.
    pub metrics: bool,
}

/// Trait for executing reconcile actions.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute an action.
    async fn execute(&self, action: &ReconcileAction) -> Result<()>;
}

/// Executor that publishes each action to the broker.
pub struct PublishExecutor {
    bus: Arc<dyn PubSub>,
}

impl PublishExecutor {
    /// Create a new publish executor.
    pub fn new(bus: Arc<dyn PubSub>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl ActionExecutor for PublishExecutor {
    async fn execute(&self, action: &ReconcileAction) -> Result<()> {
        let message = action.message()?;
        self.bus.publish(message).await?;
        Ok(())
    }
}

/// Reconciles observed containers with the registered entities.
pub struct Reconciler {
    /// Entity store and transport.
    bus: Arc<dyn PubSub>,
    /// Action executor.
    executor: Arc<dyn ActionExecutor>,
    /// Inventory source.
    lister: InventoryLister,
    /// Device the services belong to, with its cloud identity.
    device: Target,
    /// Configuration.
    config: ReconcilerConfig,
    /// Where stale entities go for cloud deletion.
    gate: Option<GateHandle>,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        bus: Arc<dyn PubSub>,
        executor: Arc<dyn ActionExecutor>,
        lister: InventoryLister,
        device: Target,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            bus,
            executor,
            lister,
            device,
            config,
            gate: None,
        }
    }

    /// Create a reconciler publishing straight to the bus.
    pub fn with_publish_executor(
        bus: Arc<dyn PubSub>,
        lister: InventoryLister,
        device: Target,
        config: ReconcilerConfig,
    ) -> Self {
        let executor = Arc::new(PublishExecutor::new(Arc::clone(&bus)));
        Self::new(bus, executor, lister, device, config)
    }

    /// Hand stale entities to a deletion gate.
    #[must_use]
    pub fn with_gate(mut self, gate: GateHandle) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Run one update pass.
    ///
    /// Only a pass with empty include filters removes stale entities.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the entity store cannot be read and
    /// `EngineUnavailable` if the engine cannot be listed. Individual publish
    /// failures are counted in the summary instead.
    pub async fn do_update(&self, criteria: &FilterCriteria) -> Result<PassSummary> {
        let full_scan = criteria.is_empty();

        let existing = container_entities(self.bus.entities().await?, &self.device);
        let items = self.lister.list(criteria).await?;

        info!(
            full_scan,
            registered = existing.len(),
            observed = items.len(),
            "Starting update pass"
        );

        let delta = self.diff(items, existing, full_scan);
        debug!(
            register = delta.to_register().count(),
            update = delta.to_update().count(),
            stale = delta.stale.len(),
            "Computed delta"
        );

        let (taken, mut failed) = self.apply_actions(delta.publish_actions()).await;

        if self.config.metrics {
            self.log_metrics(&delta.observed).await;
        }

        let (removed_taken, removed_failed) = self.apply_removals(delta.removal_actions()).await;
        failed.extend(removed_failed);

        if let Some(gate) = &self.gate {
            if let Err(e) = gate.submit(delta.stale.clone()).await {
                warn!(error = %e, "Could not hand stale entities to the deletion gate");
            }
        }

        let summary = PassSummary {
            full_scan,
            observed: delta.observed.len(),
            registered: delta.to_register().count(),
            removed: delta.stale,
            actions_taken: taken + removed_taken,
            actions_failed: failed,
        };

        if summary.all_succeeded() {
            info!(
                registered = summary.registered,
                removed = summary.removed.len(),
                actions = summary.actions_taken,
                "Update pass complete"
            );
        } else {
            warn!(
                failed = summary.failed_count(),
                actions = summary.actions_taken,
                "Update pass completed with failed publishes"
            );
        }

        Ok(summary)
    }

    /// Split observed items into new and known, and collect stale entities.
    fn diff(
        &self,
        items: Vec<ObservedItem>,
        mut existing: HashMap<String, Map<String, Value>>,
        full_scan: bool,
    ) -> ReconcileDelta {
        let mut planned_topics = HashSet::new();
        let mut observed = Vec::with_capacity(items.len());

        for item in items {
            let target = self.device.service(&item.name);
            let topic = target.topic();
            let known = existing.remove(&topic).is_some();
            let is_new = !known && !planned_topics.contains(&topic);
            if !is_new && !known {
                debug!(topic = %topic, id = %item.id(), "Duplicate display name in one pass");
            }
            planned_topics.insert(topic);
            observed.push(PlannedItem {
                target,
                item,
                is_new,
            });
        }

        let stale = if full_scan {
            existing
                .into_iter()
                .sorted_by(|(a, _), (b, _)| a.cmp(b))
                .filter_map(|(topic, attributes)| self.stale_entity(&topic, &attributes))
                .collect()
        } else {
            Vec::new()
        };

        ReconcileDelta { observed, stale }
    }

    fn stale_entity(&self, topic: &str, attributes: &Map<String, Value>) -> Option<StaleEntity> {
        match Target::from_topic(topic) {
            Ok(target) => {
                info!(topic = %topic, "Removing stale service");
                let recorded_id = attributes
                    .get("@id")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some(StaleEntity::new(
                    target.with_cloud_identity(self.device.cloud_identity.clone()),
                    recorded_id,
                ))
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Invalid topic structure");
                None
            }
        }
    }

    /// Apply a list of actions, continuing past failures.
    async fn apply_actions(
        &self,
        actions: Vec<ReconcileAction>,
    ) -> (usize, Vec<(ReconcileAction, String)>) {
        let mut taken = 0;
        let mut failed = Vec::new();

        for action in actions {
            debug!(kind = action.kind(), target = %action.target(), "Applying action");

            match self.executor.execute(&action).await {
                Ok(()) => taken += 1,
                Err(e) => {
                    warn!(action = ?action, error = %e, "Action failed");
                    failed.push((action, e.to_string()));
                }
            }
        }

        (taken, failed)
    }

    /// Apply deregistration actions.
    ///
    /// A failed twin clear does not stop the entity's deregistration. A failed
    /// health clear keeps its registration so no orphaned health status is
    /// left behind.
    async fn apply_removals(
        &self,
        actions: Vec<ReconcileAction>,
    ) -> (usize, Vec<(ReconcileAction, String)>) {
        let mut taken = 0;
        let mut failed = Vec::new();
        let mut health_kept = HashSet::new();

        for action in actions {
            if let ReconcileAction::ClearRegistration { target } = &action {
                if health_kept.contains(&target.topic()) {
                    warn!(target = %target, "Keeping registration, health status could not be cleared");
                    continue;
                }
            }

            debug!(kind = action.kind(), target = %action.target(), "Applying action");

            match self.executor.execute(&action).await {
                Ok(()) => taken += 1,
                Err(e) => {
                    warn!(action = ?action, error = %e, "Action failed");
                    if let ReconcileAction::ClearHealth { target } = &action {
                        health_kept.insert(target.topic());
                    }
                    failed.push((action, e.to_string()));
                }
            }
        }

        (taken, failed)
    }

    async fn log_metrics(&self, observed: &[PlannedItem]) {
        for planned in observed {
            match self.lister.stats(planned.item.id()).await {
                Ok(stats) => info!(
                    name = %planned.item.name,
                    cpu = stats.cpu,
                    memory = stats.memory,
                    net_tx = stats.net_tx,
                    "Container stats"
                ),
                Err(e) => warn!(name = %planned.item.name, error = %e, "Failed to read container stats"),
            }
        }
    }

    /// Get the bus.
    pub fn bus(&self) -> &Arc<dyn PubSub> {
        &self.bus
    }

    /// Get the device target.
    pub fn device(&self) -> &Target {
        &self.device
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

/// Keep only container and container-group entities.
/// Container services registered under `device`. Entities of other devices
/// sharing the broker are never candidates for removal.
fn container_entities(
    entities: Entities,
    device: &Target,
) -> HashMap<String, Map<String, Value>> {
    let own_services = device.service("+").topic();
    entities
        .into_iter()
        .filter(|(topic, _)| topic::matches(&own_services, topic))
        .filter(|(_, attributes)| {
            matches!(
                attributes.get("type").and_then(Value::as_str),
                Some(CONTAINER_TYPE | CONTAINER_GROUP_TYPE)
            )
        })
        .collect()
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    bus: Option<Arc<dyn PubSub>>,
    executor: Option<Arc<dyn ActionExecutor>>,
    lister: Option<InventoryLister>,
    device: Option<Target>,
    gate: Option<GateHandle>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            bus: None,
            executor: None,
            lister: None,
            device: None,
            gate: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the bus.
    pub fn with_bus(mut self, bus: Arc<dyn PubSub>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Set a custom action executor.
    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the inventory lister.
    pub fn with_lister(mut self, lister: InventoryLister) -> Self {
        self.lister = Some(lister);
        self
    }

    /// Set the device target.
    pub fn with_device(mut self, device: Target) -> Self {
        self.device = Some(device);
        self
    }

    /// Set the deletion gate.
    pub fn with_gate(mut self, gate: GateHandle) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Enable/disable stats collection.
    pub fn metrics(mut self, enabled: bool) -> Self {
        self.config.metrics = enabled;
        self
    }

    /// Build the reconciler.
    pub fn build(self) -> Result<Reconciler> {
        let bus = self
            .bus
            .ok_or_else(|| Error::invalid_config("Bus is required"))?;
        let lister = self
            .lister
            .ok_or_else(|| Error::invalid_config("Inventory lister is required"))?;
        let device = self
            .device
            .ok_or_else(|| Error::invalid_config("Device target is required"))?;

        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(PublishExecutor::new(Arc::clone(&bus))));

        let reconciler = Reconciler::new(bus, executor, lister, device, self.config);
        Ok(match self.gate {
            Some(gate) => reconciler.with_gate(gate),
            None => reconciler,
        })
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
