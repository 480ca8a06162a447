//! Cloud resolution: find or create the one cloud record clusters live under.

use tracing::info;

use crate::client::{AccountScope, InventoryApi};
use crate::error::RegistrationError;
use crate::model::CloudRecord;

/// Resolves the cloud for a registration.
pub struct CloudResolver<'a> {
    api: &'a dyn InventoryApi,
    scope: &'a AccountScope,
}

impl<'a> CloudResolver<'a> {
    pub fn new(api: &'a dyn InventoryApi, scope: &'a AccountScope) -> Self {
        Self { api, scope }
    }

    /// Return the cloud id to register under.
    ///
    /// A configured id must exist and is never created. Without one, the
    /// account's private cloud is used, creating it if absent.
    pub async fn resolve_cloud(&self, configured: Option<&str>) -> Result<String, RegistrationError> {
        if let Some(cloud_id) = configured.filter(|id| !id.is_empty()) {
            info!(cloud_id = %cloud_id, "Validating the configured cloud id");
            return match self.api.get_cloud(self.scope, cloud_id).await {
                Ok(_) => Ok(cloud_id.to_string()),
                Err(RegistrationError::NotFound { .. }) => Err(RegistrationError::NotFound {
                    reason: format!("cloud '{cloud_id}' does not exist"),
                }),
                Err(e) => Err(e),
            };
        }

        if let Some(cloud) = self.find_private_cloud().await? {
            let cloud_id = cloud.id.unwrap_or_default();
            info!(cloud_id = %cloud_id, "Found private cloud");
            return Ok(cloud_id);
        }

        info!("Private cloud does not exist, creating it");
        let created = self
            .api
            .create_cloud(self.scope, CloudRecord::private())
            .await?;

        match created.id.filter(|id| !id.is_empty()) {
            Some(cloud_id) => {
                info!(cloud_id = %cloud_id, "Created private cloud");
                Ok(cloud_id)
            }
            None => Err(RegistrationError::InvalidRequest(
                "Got empty cloud id from POST call to clouds".to_string(),
            )),
        }
    }

    /// The account's private cloud, if one with an id exists.
    pub async fn find_private_cloud(&self) -> Result<Option<CloudRecord>, RegistrationError> {
        let clouds = self.api.list_clouds(self.scope).await?;
        Ok(clouds
            .into_iter()
            .find(|cloud| cloud.is_private() && cloud.id.as_deref().is_some_and(|id| !id.is_empty())))
    }
}
