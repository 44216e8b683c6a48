//! Application facade.
//!
//! Wires the transport, the engine and the cloud client into a reconciler
//! behind the update worker, and exposes the triggers that feed it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use twinmon_bus::{Message, PubSub};
use twinmon_cloud::CloudInventory;
use twinmon_core::{Settings, Target};
use twinmon_engine::{ContainerEngine, FilterCriteria, InventoryLister};

use crate::error::Result;
use crate::gate::CloudDeletionGate;
use crate::monitor::EventMonitor;
use crate::r#loop::{LoopConfig, LoopStopper, PollingLoop};
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::types::PassSummary;
use crate::worker::UpdateWorker;

/// Everything the application needs from the settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Device the monitor runs on. An empty cloud identity is resolved on start.
    pub device: Target,
    /// Name the monitor registers itself under.
    pub service_name: String,
    /// Criteria for polling passes and the base for event passes.
    pub criteria: FilterCriteria,
    pub metrics: bool,
    pub forward_events: bool,
    pub delete_from_cloud: bool,
    pub deletion_grace: Duration,
    pub identity_retry: Duration,
    pub interval: Duration,
}

impl AppConfig {
    /// Derive the application config from loaded settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let monitor = &settings.monitor;
        Self {
            device: settings.device_target(),
            service_name: monitor.service_name.clone(),
            criteria: FilterCriteria::from(&monitor.filter),
            metrics: monitor.metrics.enabled,
            forward_events: monitor.events.enabled,
            delete_from_cloud: monitor.delete_from_cloud.enabled,
            deletion_grace: Duration::from_millis(monitor.delete_from_cloud.grace_ms),
            identity_retry: Duration::from_secs(monitor.identity_retry_secs),
            interval: settings.polling_interval(),
        }
    }
}

/// The running monitor.
pub struct App {
    config: AppConfig,
    device: Target,
    bus: Arc<dyn PubSub>,
    engine: Arc<dyn ContainerEngine>,
    worker: Arc<UpdateWorker>,
    gate: Option<CloudDeletionGate>,
}

impl App {
    /// Resolve the cloud identity if needed, then spawn the worker and gate.
    ///
    /// The identity lookup is retried until it succeeds.
    pub async fn start(
        config: AppConfig,
        bus: Arc<dyn PubSub>,
        engine: Arc<dyn ContainerEngine>,
        cloud: Arc<dyn CloudInventory>,
    ) -> Self {
        let mut device = config.device.clone();
        if device.cloud_identity.is_empty() {
            let identity = resolve_identity(cloud.as_ref(), config.identity_retry).await;
            device = device.with_cloud_identity(identity);
        }
        info!(device = %device, cloud_identity = %device.cloud_identity, "Using device");

        let gate = config
            .delete_from_cloud
            .then(|| CloudDeletionGate::spawn(cloud, config.deletion_grace));

        let mut reconciler = Reconciler::with_publish_executor(
            Arc::clone(&bus),
            InventoryLister::new(Arc::clone(&engine)),
            device.clone(),
            ReconcilerConfig {
                metrics: config.metrics,
            },
        );
        if let Some(gate) = &gate {
            reconciler = reconciler.with_gate(gate.handle());
        }
        let worker = Arc::new(UpdateWorker::spawn(Arc::new(reconciler)));

        Self {
            config,
            device,
            bus,
            engine,
            worker,
            gate,
        }
    }

    /// Run one pass through the worker and wait for it.
    ///
    /// # Errors
    ///
    /// Returns the pass error, or `WorkerStopped` after `stop`.
    pub async fn update(&self, criteria: FilterCriteria) -> Result<PassSummary> {
        self.worker.update(criteria).await
    }

    /// Follow engine events until `stop` turns true.
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` if the event subscription cannot be opened.
    pub async fn monitor(&self, stop: watch::Receiver<bool>, criteria: FilterCriteria) -> Result<()> {
        let monitor = EventMonitor::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.worker),
            Arc::clone(&self.bus),
            self.device.clone(),
            self.config.forward_events,
        );
        monitor.run(stop, criteria).await
    }

    /// Route on-demand health check commands to update passes.
    ///
    /// A command addressed to the monitor itself runs a full pass; any other
    /// service name runs a pass for that name only.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the subscription fails.
    pub async fn subscribe_commands(&self) -> Result<()> {
        let filter = self.device.service("+").command_topic();
        let worker = Arc::clone(&self.worker);
        let criteria = self.config.criteria.clone();
        let service_name = self.config.service_name.clone();

        info!(filter = %filter, "Listening for health check commands");
        self.bus
            .add_route(
                &filter,
                Arc::new(move |message: Message| {
                    let Some(name) = message.topic.split('/').nth(4).map(str::to_string) else {
                        return;
                    };
                    info!(topic = %message.topic, name = %name, "Received health check command");
                    let criteria = command_criteria(&criteria, &service_name, &name);
                    let worker = Arc::clone(&worker);
                    tokio::spawn(async move {
                        if let Err(e) = worker.update(criteria).await {
                            warn!(name = %name, error = %e, "Health check update failed");
                        }
                    });
                }),
            )
            .await?;
        Ok(())
    }

    /// Spawn the polling loop.
    pub fn run_polling(&self) -> (JoinHandle<()>, LoopStopper) {
        let mut polling = PollingLoop::new(
            Arc::clone(&self.worker),
            self.config.criteria.clone(),
            LoopConfig {
                interval: self.config.interval,
            },
        );
        let stopper = polling.stopper();
        (tokio::spawn(async move { polling.run().await }), stopper)
    }

    /// Stop the worker, drain the deletion gate, then release the transport.
    ///
    /// A clean stop disconnects so the broker discards the last will.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the disconnect fails.
    pub async fn stop(&self, clean: bool) -> Result<()> {
        info!(clean, "Stopping");
        self.worker.stop().await;
        if let Some(gate) = &self.gate {
            gate.shutdown().await;
        }
        self.bus.disconnect(clean).await?;
        Ok(())
    }

    /// The device, with its resolved cloud identity.
    pub fn device(&self) -> &Target {
        &self.device
    }

    /// The configured criteria.
    pub fn criteria(&self) -> &FilterCriteria {
        &self.config.criteria
    }

    /// The deletion gate, when cloud deletion is enabled.
    pub fn gate(&self) -> Option<&CloudDeletionGate> {
        self.gate.as_ref()
    }

    /// Whether a pass is running.
    pub fn is_busy(&self) -> bool {
        self.worker.is_busy()
    }
}

/// Criteria for a health check command addressed to `name`.
fn command_criteria(base: &FilterCriteria, service_name: &str, name: &str) -> FilterCriteria {
    if name == service_name {
        base.clone()
    } else {
        base.with_names([format!("^{name}$")])
    }
}

async fn resolve_identity(cloud: &dyn CloudInventory, retry: Duration) -> String {
    loop {
        match cloud.current_identity().await {
            Ok(identity) if !identity.is_empty() => return identity,
            Ok(_) => warn!("Cloud returned an empty device identity"),
            Err(e) => warn!(error = %e, retry_secs = retry.as_secs(), "Could not read device identity, retrying"),
        }
        tokio::time::sleep(retry).await;
    }
}
