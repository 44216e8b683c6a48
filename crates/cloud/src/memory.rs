//! In-memory cloud inventory for testing.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::inventory::{CloudInventory, ManagedObjectRef};

/// In-memory inventory keyed by external id.
#[derive(Default)]
pub struct InMemoryCloud {
    identity: RwLock<Option<String>>,
    objects: RwLock<BTreeMap<String, String>>,
    deleted: RwLock<Vec<ManagedObjectRef>>,
    lookups: RwLock<Vec<String>>,
    failing_deletes: RwLock<HashSet<String>>,
    identity_failures: RwLock<usize>,
}

impl InMemoryCloud {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an inventory for a device identity.
    pub fn with_identity(identity: impl Into<String>) -> Self {
        Self {
            identity: RwLock::new(Some(identity.into())),
            ..Self::default()
        }
    }

    /// Register a managed object under an external id.
    pub async fn insert(&self, external_id: impl Into<String>, id: impl Into<String>) {
        self.objects
            .write()
            .await
            .insert(external_id.into(), id.into());
    }

    /// Whether an external id still resolves.
    pub async fn contains(&self, external_id: &str) -> bool {
        self.objects.read().await.contains_key(external_id)
    }

    /// Make deleting the object with this external id fail.
    pub async fn fail_delete(&self, external_id: impl Into<String>) {
        self.failing_deletes.write().await.insert(external_id.into());
    }

    /// Fail the next `count` identity lookups.
    pub async fn fail_identity(&self, count: usize) {
        *self.identity_failures.write().await = count;
    }

    /// Deleted objects, in order.
    pub async fn deleted(&self) -> Vec<ManagedObjectRef> {
        self.deleted.read().await.clone()
    }

    /// External ids looked up, in order.
    pub async fn lookups(&self) -> Vec<String> {
        self.lookups.read().await.clone()
    }
}

#[async_trait]
impl CloudInventory for InMemoryCloud {
    async fn current_identity(&self) -> Result<String> {
        {
            let mut failures = self.identity_failures.write().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::request("proxy unreachable"));
            }
        }
        self.identity
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::unexpected_status("/user/currentUser", 401))
    }

    async fn lookup_external_id(&self, external_id: &str) -> Result<Option<ManagedObjectRef>> {
        self.lookups.write().await.push(external_id.to_string());
        Ok(self
            .objects
            .read()
            .await
            .get(external_id)
            .map(|id| ManagedObjectRef {
                id: id.clone(),
                external_id: external_id.to_string(),
            }))
    }

    async fn delete_managed_object(&self, object: &ManagedObjectRef) -> Result<()> {
        if self.failing_deletes.read().await.contains(&object.external_id) {
            return Err(Error::unexpected_status(
                format!("/inventory/managedObjects/{}", object.id),
                500,
            ));
        }
        self.objects.write().await.remove(&object.external_id);
        self.deleted.write().await.push(object.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_of_unknown_id_is_none() {
        let cloud = InMemoryCloud::with_identity("dev01");
        let found = cloud.lookup_external_id("dev01:device:main:service:web").await;
        assert!(matches!(found, Ok(None)));
    }

    #[tokio::test]
    async fn delete_removes_object() {
        let cloud = InMemoryCloud::with_identity("dev01");
        cloud.insert("dev01:device:main:service:web", "1234").await;

        let found = cloud
            .lookup_external_id("dev01:device:main:service:web")
            .await
            .ok()
            .flatten();
        assert_eq!(found.as_ref().map(|o| o.id.as_str()), Some("1234"));

        if let Some(object) = found {
            assert!(cloud.delete_managed_object(&object).await.is_ok());
        }
        assert!(!cloud.contains("dev01:device:main:service:web").await);
        assert_eq!(cloud.deleted().await.len(), 1);
    }

    #[tokio::test]
    async fn identity_failures_are_transient() {
        let cloud = InMemoryCloud::with_identity("dev01");
        cloud.fail_identity(2).await;
        assert!(cloud.current_identity().await.is_err());
        assert!(cloud.current_identity().await.is_err());
        assert_eq!(cloud.current_identity().await.ok().as_deref(), Some("dev01"));
    }
}
