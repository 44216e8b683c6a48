//! Periodic polling loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};
use twinmon_engine::FilterCriteria;

use crate::worker::UpdateWorker;

/// Configuration for the polling loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Interval between passes.
    pub interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

/// Periodic full-pass trigger.
///
/// The first pass is due one interval after `run` starts; the initial pass
/// is the caller's job.
pub struct PollingLoop {
    /// The update worker.
    worker: Arc<UpdateWorker>,
    /// Criteria for every pass.
    criteria: FilterCriteria,
    /// Loop configuration.
    config: LoopConfig,
    /// Stop signal receiver.
    stop_rx: watch::Receiver<bool>,
    /// Stop signal sender (for external control).
    stop_tx: watch::Sender<bool>,
}

impl PollingLoop {
    /// Create a new polling loop.
    pub fn new(worker: Arc<UpdateWorker>, criteria: FilterCriteria, config: LoopConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            worker,
            criteria,
            config,
            stop_rx,
            stop_tx,
        }
    }

    /// Run until stopped. Pass errors are logged and never end the loop.
    pub async fn run(&mut self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting polling loop"
        );

        let mut consecutive_errors = 0usize;
        let mut interval =
            tokio::time::interval_at(Instant::now() + self.config.interval, self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    debug!("Polling tick");
                    match self.worker.update(self.criteria.clone()).await {
                        Ok(summary) => {
                            consecutive_errors = 0;
                            debug!(observed = summary.observed, "Polling pass finished");
                        }
                        Err(e) => {
                            consecutive_errors += 1;
                            error!(
                                error = %e,
                                consecutive = consecutive_errors,
                                "Polling pass failed"
                            );
                        }
                    }
                }
                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        info!("Polling loop stopped");
                        return;
                    }
                }
            }
        }
    }

    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Get a stopper handle.
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }
}

/// Handle to stop a polling loop.
#[derive(Clone)]
pub struct LoopStopper {
    stop_tx: watch::Sender<bool>,
}

impl LoopStopper {
    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}
