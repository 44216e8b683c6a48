//! Reconciliation of observed containers with their digital twins.
//!
//! Each update pass:
//! 1. Reads the registered entities from the broker's retained store
//! 2. Lists the containers matching the pass criteria
//! 3. Registers new items, then re-publishes health and twin for all items
//! 4. On a full scan only, clears and deregisters the entities nobody
//!    observed, and hands them to the cloud deletion gate
//!
//! # Triggers
//!
//! Passes never run concurrently. Every trigger goes through the
//! [`UpdateWorker`]:
//!
//! - the [`PollingLoop`] (full pass on an interval)
//! - the [`EventMonitor`] (targeted or full pass per engine event)
//! - health check commands routed by [`App::subscribe_commands`]
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use twinmon_bus::InMemoryBroker;
//! use twinmon_cloud::InMemoryCloud;
//! use twinmon_core::Settings;
//! use twinmon_engine::InMemoryEngine;
//! use twinmon_reconciler::{App, AppConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::from_settings(&Settings::default());
//!     let app = App::start(
//!         config,
//!         Arc::new(InMemoryBroker::new()),
//!         Arc::new(InMemoryEngine::new()),
//!         Arc::new(InMemoryCloud::with_identity("dev01")),
//!     )
//!     .await;
//!
//!     let summary = app.update(app.criteria().clone()).await;
//!     app.stop(true).await.ok();
//! }
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod app;
pub mod error;
pub mod gate;
pub mod r#loop;
pub mod monitor;
pub mod reconciler;
pub mod types;
pub mod worker;

// Re-export main types
pub use app::{App, AppConfig};
pub use error::{Error, Result};
pub use gate::{BatchReport, CloudDeletionGate, GateHandle, process_batch};
pub use monitor::{EventMonitor, EventPolicy, policy};
pub use r#loop::{LoopConfig, LoopStopper, PollingLoop};
pub use reconciler::{
    ActionExecutor, PublishExecutor, Reconciler, ReconcilerBuilder, ReconcilerConfig,
};
pub use types::{PassSummary, PlannedItem, ReconcileAction, ReconcileDelta, StaleEntity};
pub use worker::UpdateWorker;
