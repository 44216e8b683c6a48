//! Cloud inventory seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identity type under which thin-edge registers its entities.
pub const SERIAL_IDENTITY_TYPE: &str = "c8y_Serial";

/// Reference to a managed object resolved from an external id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagedObjectRef {
    /// Internal managed object id.
    pub id: String,
    /// External id it was resolved from.
    pub external_id: String,
}

/// Cloud inventory operations used for stale entity cleanup.
#[async_trait]
pub trait CloudInventory: Send + Sync {
    /// External id of the device the agent runs on.
    async fn current_identity(&self) -> Result<String>;

    /// Resolve an external id. Not found is `Ok(None)`.
    async fn lookup_external_id(&self, external_id: &str) -> Result<Option<ManagedObjectRef>>;

    /// Delete a managed object.
    async fn delete_managed_object(&self, object: &ManagedObjectRef) -> Result<()>;
}
