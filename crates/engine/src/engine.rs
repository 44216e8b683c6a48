//! Container engine seam.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::Result;
use crate::event::EventStream;
use crate::filter::ServerFilter;
use crate::model::{ContainerSummary, StatsSnapshot};

/// Operations the monitor needs from a container engine.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// List all containers (running or not) matching the filter, with sizes.
    async fn list_containers(&self, filter: &ServerFilter) -> Result<Vec<ContainerSummary>>;

    /// One-shot resource usage of a container.
    async fn stats(&self, id: &str) -> Result<StatsSnapshot>;

    /// Subscribe to lifecycle events until `stop` turns true.
    async fn events(&self, stop: watch::Receiver<bool>) -> Result<EventStream>;
}
