//! Deferred cloud deletion of stale entities.
//!
//! Deregistration only removes an entity locally. The cloud keeps the
//! managed object until it is deleted explicitly, and deleting it before the
//! local agent has processed the deregistration can re-create it. The gate
//! receives batches after each full scan, waits a grace period, then deletes
//! each entity's managed object by external id.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use twinmon_cloud::CloudInventory;

use crate::error::{Error, Result};
use crate::types::StaleEntity;

/// Pending batches the gate buffers before `submit` waits.
const QUEUE_DEPTH: usize = 32;

/// Outcome of one processed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// External ids whose managed object was deleted.
    pub deleted: Vec<String>,
    /// External ids that no longer resolved.
    pub not_found: Vec<String>,
    /// Topics skipped because the cloud identity is unknown.
    pub skipped: Vec<String>,
    /// External ids whose lookup or delete failed.
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    /// Number of entities in the batch.
    pub fn total(&self) -> usize {
        self.deleted.len() + self.not_found.len() + self.skipped.len() + self.failed.len()
    }
}

/// Cheap handle used by the reconciler to hand off stale entities.
#[derive(Clone)]
pub struct GateHandle {
    tx: mpsc::Sender<Vec<StaleEntity>>,
}

impl GateHandle {
    /// Queue a batch for deletion.
    ///
    /// # Errors
    ///
    /// Returns `WorkerStopped` if the gate has shut down.
    pub async fn submit(&self, batch: Vec<StaleEntity>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.tx.send(batch).await.map_err(|_| Error::WorkerStopped)
    }
}

/// Background task deleting stale entities from the cloud.
pub struct CloudDeletionGate {
    tx: mpsc::Sender<Vec<StaleEntity>>,
    shutdown_tx: watch::Sender<bool>,
    reports: Arc<RwLock<Vec<BatchReport>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CloudDeletionGate {
    /// Spawn the gate.
    pub fn spawn(cloud: Arc<dyn CloudInventory>, grace: Duration) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reports = Arc::new(RwLock::new(Vec::new()));

        let runner = GateRunner {
            cloud,
            grace,
            reports: Arc::clone(&reports),
        };
        let task = tokio::spawn(runner.run(rx, shutdown_rx));

        Self {
            tx,
            shutdown_tx,
            reports,
            task: Mutex::new(Some(task)),
        }
    }

    /// A handle for submitting batches.
    pub fn handle(&self) -> GateHandle {
        GateHandle {
            tx: self.tx.clone(),
        }
    }

    /// Reports of every processed batch, in order.
    pub async fn reports(&self) -> Vec<BatchReport> {
        self.reports.read().await.clone()
    }

    /// Process the batches already queued, then stop.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Cloud deletion gate ended abnormally");
            }
        }
    }
}

struct GateRunner {
    cloud: Arc<dyn CloudInventory>,
    grace: Duration,
    reports: Arc<RwLock<Vec<BatchReport>>>,
}

impl GateRunner {
    async fn run(
        self,
        mut rx: mpsc::Receiver<Vec<StaleEntity>>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                batch = rx.recv() => match batch {
                    Some(batch) => self.process(batch).await,
                    None => break,
                },
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        rx.close();
        while let Some(batch) = rx.recv().await {
            self.process(batch).await;
        }
        debug!("Cloud deletion gate stopped");
    }

    async fn process(&self, batch: Vec<StaleEntity>) {
        tokio::time::sleep(self.grace).await;
        let report = process_batch(self.cloud.as_ref(), &batch).await;
        info!(
            deleted = report.deleted.len(),
            not_found = report.not_found.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Processed cloud deletion batch"
        );
        self.reports.write().await.push(report);
    }
}

/// Delete every entity of a batch, continuing past failures.
pub async fn process_batch(cloud: &dyn CloudInventory, batch: &[StaleEntity]) -> BatchReport {
    let mut report = BatchReport::default();

    for stale in batch {
        let topic = stale.target.topic();
        let Some(external_id) = stale.external_id() else {
            debug!(topic = %topic, "No cloud identity, skipping cloud deletion");
            report.skipped.push(topic);
            continue;
        };

        info!(topic = %topic, external_id = %external_id, "Removing service from the cloud");
        match cloud.lookup_external_id(&external_id).await {
            Ok(None) => {
                debug!(external_id = %external_id, "Managed object already gone");
                report.not_found.push(external_id);
            }
            Ok(Some(object)) => match cloud.delete_managed_object(&object).await {
                Ok(()) => report.deleted.push(external_id),
                Err(e) => {
                    warn!(external_id = %external_id, error = %e, "Failed to delete managed object");
                    report.failed.push((external_id, e.to_string()));
                }
            },
            Err(e) => {
                warn!(external_id = %external_id, error = %e, "Failed to look up external id");
                report.failed.push((external_id, e.to_string()));
            }
        }
    }

    report
}
