//! Serialized update worker.
//!
//! One task owns the reconciler. Every trigger sends its criteria together
//! with a one-shot reply channel and waits; the depth-one queue keeps at most
//! one pass running and one waiting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use twinmon_engine::FilterCriteria;

use crate::error::{Error, Result};
use crate::reconciler::Reconciler;
use crate::types::PassSummary;

struct UpdateRequest {
    criteria: FilterCriteria,
    reply: oneshot::Sender<Result<PassSummary>>,
}

/// Single-flight front end of the reconciler.
pub struct UpdateWorker {
    tx: mpsc::Sender<UpdateRequest>,
    shutdown_tx: watch::Sender<bool>,
    busy: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl UpdateWorker {
    /// Spawn the worker task.
    pub fn spawn(reconciler: Arc<Reconciler>) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let busy = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run(reconciler, rx, shutdown_rx, Arc::clone(&busy)));

        Self {
            tx,
            shutdown_tx,
            busy,
            task: Mutex::new(Some(task)),
        }
    }

    /// Request a pass and wait for its result.
    ///
    /// # Errors
    ///
    /// Returns `WorkerStopped` if the worker is gone, otherwise the pass error.
    pub async fn update(&self, criteria: FilterCriteria) -> Result<PassSummary> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(UpdateRequest { criteria, reply })
            .await
            .map_err(|_| Error::WorkerStopped)?;
        response.await.map_err(|_| Error::WorkerStopped)?
    }

    /// Whether a pass is running right now.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Stop after the in-flight pass and wait for the task to end.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Update worker ended abnormally");
            }
        }
    }
}

async fn run(
    reconciler: Arc<Reconciler>,
    mut rx: mpsc::Receiver<UpdateRequest>,
    mut shutdown_rx: watch::Receiver<bool>,
    busy: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Stopping update worker");
                    break;
                }
            }
            request = rx.recv() => {
                let Some(UpdateRequest { criteria, reply }) = request else {
                    break;
                };
                info!("Processing update request");
                busy.store(true, Ordering::SeqCst);
                let result = reconciler.do_update(&criteria).await;
                busy.store(false, Ordering::SeqCst);
                if reply.send(result).is_err() {
                    debug!("Update requester went away before the result");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::ReconcilerConfig;
    use twinmon_bus::InMemoryBroker;
    use twinmon_core::Target;
    use twinmon_engine::{ContainerSummary, InMemoryEngine, InventoryLister};

    fn setup() -> (UpdateWorker, Arc<InMemoryEngine>) {
        let engine = Arc::new(InMemoryEngine::new());
        let reconciler = Reconciler::with_publish_executor(
            Arc::new(InMemoryBroker::new()),
            InventoryLister::new(engine.clone()),
            Target::new("te", "device/main//", ""),
            ReconcilerConfig::default(),
        );
        (UpdateWorker::spawn(Arc::new(reconciler)), engine)
    }

    #[tokio::test]
    async fn test_update_returns_pass_summary() {
        let (worker, engine) = setup();
        engine
            .upsert(ContainerSummary::new("abc", "/nginx", "running"))
            .await;

        let summary = worker.update(FilterCriteria::default()).await;

        assert_eq!(summary.ok().map(|s| s.observed), Some(1));
        assert!(!worker.is_busy());
    }

    #[tokio::test]
    async fn test_pass_errors_reach_the_caller() {
        let (worker, engine) = setup();
        engine.set_unavailable(true);

        let result = worker.update(FilterCriteria::default()).await;

        assert!(matches!(result, Err(Error::EngineUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_update_after_stop_fails() {
        let (worker, _) = setup();
        worker.stop().await;

        let result = worker.update(FilterCriteria::default()).await;

        assert!(matches!(result, Err(Error::WorkerStopped)));
    }
}
