//! Cumulocity REST client.
//!
//! Requests go through the thin-edge local proxy
//! (`http://127.0.0.1:8001/c8y`), which adds the device credentials.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};
use twinmon_core::CloudSettings;
use url::Url;

use crate::error::{Error, Result};
use crate::inventory::{CloudInventory, ManagedObjectRef, SERIAL_IDENTITY_TYPE};

/// Prefix of device user names.
const DEVICE_USER_PREFIX: &str = "device_";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Cumulocity client reached through the local proxy.
#[derive(Debug, Clone)]
pub struct CumulocityClient {
    base_url: Url,
    http_client: reqwest::Client,
}

impl CumulocityClient {
    /// Create a client for `http://<host>:<port>/c8y`.
    ///
    /// # Errors
    ///
    /// Returns `Request` if the address is invalid or the HTTP client cannot
    /// be built.
    pub fn new(settings: &CloudSettings) -> Result<Self> {
        let base_url = Url::parse(&format!("http://{}:{}/c8y", settings.host, settings.port))
            .map_err(|e| Error::request(format!("invalid proxy address: {e}")))?;
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// Proxy base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `<base>/<segments...>` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::request("proxy address cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    #[serde(rename = "userName")]
    user_name: String,
}

#[derive(Debug, Deserialize)]
struct ExternalIdResponse {
    #[serde(rename = "managedObject")]
    managed_object: ManagedObjectId,
}

#[derive(Debug, Deserialize)]
struct ManagedObjectId {
    id: String,
}

#[async_trait]
impl CloudInventory for CumulocityClient {
    async fn current_identity(&self) -> Result<String> {
        let url = self.endpoint(&["user", "currentUser"])?;
        let response = self.http_client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(Error::unexpected_status(url.path(), response.status().as_u16()));
        }

        let user: CurrentUser = response
            .json()
            .await
            .map_err(|e| Error::invalid_response(e.to_string()))?;
        let identity = user
            .user_name
            .strip_prefix(DEVICE_USER_PREFIX)
            .unwrap_or(&user.user_name)
            .to_string();
        info!(identity = %identity, "Resolved device identity");
        Ok(identity)
    }

    async fn lookup_external_id(&self, external_id: &str) -> Result<Option<ManagedObjectRef>> {
        let url = self.endpoint(&["identity", "externalIds", SERIAL_IDENTITY_TYPE, external_id])?;
        debug!(external_id = %external_id, "Looking up external id");

        let response = self.http_client.get(url.clone()).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: ExternalIdResponse = response
                    .json()
                    .await
                    .map_err(|e| Error::invalid_response(e.to_string()))?;
                Ok(Some(ManagedObjectRef {
                    id: body.managed_object.id,
                    external_id: external_id.to_string(),
                }))
            }
            status => Err(Error::unexpected_status(url.path(), status.as_u16())),
        }
    }

    async fn delete_managed_object(&self, object: &ManagedObjectRef) -> Result<()> {
        let url = self.endpoint(&["inventory", "managedObjects", object.id.as_str()])?;
        info!(id = %object.id, external_id = %object.external_id, "Deleting managed object");

        let response = self.http_client.delete(url.clone()).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::unexpected_status(url.path(), response.status().as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn client() -> CumulocityClient {
        CumulocityClient::new(&CloudSettings::default()).unwrap()
    }

    #[test]
    fn test_default_base_url() {
        assert_eq!(client().base_url().as_str(), "http://127.0.0.1:8001/c8y");
    }

    #[test]
    fn test_endpoint_encodes_external_id() {
        let url = client()
            .endpoint(&["identity", "externalIds", "c8y_Serial", "dev01:device:main:service:app@web"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8001/c8y/identity/externalIds/c8y_Serial/dev01:device:main:service:app@web"
        );

        let url = client()
            .endpoint(&["identity", "externalIds", "c8y_Serial", "a/b c"])
            .unwrap();
        assert!(url.as_str().ends_with("/c8y_Serial/a%2Fb%20c"));
    }
}
