//! Inventory lister.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::engine::ContainerEngine;
use crate::error::{Error, Result};
use crate::filter::FilterCriteria;
use crate::model::{ObservedItem, StatsSnapshot};

/// Lists and normalizes the containers matching a criteria.
#[derive(Clone)]
pub struct InventoryLister {
    engine: Arc<dyn ContainerEngine>,
}

impl InventoryLister {
    /// Create a lister over an engine.
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// List observed items, in engine order.
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` if the engine cannot be queried.
    pub async fn list(&self, criteria: &FilterCriteria) -> Result<Vec<ObservedItem>> {
        let server = criteria.server_filter();
        let client = criteria.client_filter();

        let summaries = self
            .engine
            .list_containers(&server)
            .await
            .map_err(|e| match e {
                Error::EngineUnavailable { .. } => e,
                other => Error::unavailable(other.to_string()),
            })?;

        let now = Utc::now();
        let total = summaries.len();
        let items: Vec<ObservedItem> = summaries
            .iter()
            .map(|summary| ObservedItem::from_summary(summary, now))
            .filter(|item| {
                if item.name.is_empty() {
                    warn!(id = %item.id(), "Skipping container without a name");
                    return false;
                }
                true
            })
            .filter(|item| client.accepts(item))
            .collect();

        debug!(
            listed = total,
            accepted = items.len(),
            "Listed containers"
        );
        Ok(items)
    }

    /// Resource usage of one container.
    ///
    /// # Errors
    ///
    /// Propagates engine errors.
    pub async fn stats(&self, id: &str) -> Result<StatsSnapshot> {
        self.engine.stats(id).await
    }

    /// The underlying engine.
    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }
}
