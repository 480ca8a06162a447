//! Registration orchestration.
//!
//! `register` walks cloud resolution, cluster resolution and promotion in
//! order. Nothing is rolled back on failure: a pending cluster record left
//! behind is found again by the next call and resumed, so an external loop
//! can simply call `register` until it succeeds or reports a terminal error.

use std::sync::Arc;

use registrar_transport::{PollPolicy, Sleeper, TokioSleeper};
use tracing::{info, instrument, warn};

use crate::client::{AccountScope, ApiToken, InventoryApi};
use crate::cloud::CloudResolver;
use crate::cluster::{ClusterResolver, ResolvedCluster};
use crate::collaborators::{LocalClusterInfo, SecretLookup, WorkloadIdentity};
use crate::error::RegistrationError;
use crate::model::{connector_capabilities, ClusterRecord, ManagedState};

/// Inputs of one registration.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub account_id: String,
    /// Cloud to register under; the private cloud when unset.
    pub cloud_id: Option<String>,
    /// Existing cluster record to re-attach to.
    pub cluster_id: Option<String>,
    /// Display name; the workload identity when empty.
    pub cluster_name: String,
    /// Name of the secret holding the API token.
    pub token_ref: String,
    pub namespace: String,
    pub api_server_url: String,
    pub credential_id: String,
}

/// Drives registration against the inventory.
pub struct Registrar {
    api: Arc<dyn InventoryApi>,
    secrets: Arc<dyn SecretLookup>,
    cluster_info: Arc<dyn LocalClusterInfo>,
    identity: Arc<dyn WorkloadIdentity>,
    sleeper: Arc<dyn Sleeper>,
    poll: PollPolicy,
}

impl Registrar {
    pub fn new(
        api: Arc<dyn InventoryApi>,
        secrets: Arc<dyn SecretLookup>,
        cluster_info: Arc<dyn LocalClusterInfo>,
        identity: Arc<dyn WorkloadIdentity>,
    ) -> Self {
        Self {
            api,
            secrets,
            cluster_info,
            identity,
            sleeper: Arc::new(TokioSleeper),
            poll: PollPolicy::default(),
        }
    }

    /// Override how `unregister` waits for the inventory.
    pub fn with_poll(mut self, poll: PollPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        self.poll = poll;
        self.sleeper = sleeper;
        self
    }

    /// Register this cluster and return its cluster id.
    #[instrument(skip_all, fields(account_id = %settings.account_id))]
    pub async fn register(&self, settings: &Settings) -> Result<String, RegistrationError> {
        let scope = self.scope(settings).await?;

        let api_service_id = self
            .identity
            .api_service_id()
            .await
            .map_err(|e| RegistrationError::Collaborator {
                reason: format!("Failed to get the apiServiceID of this cluster: {e}"),
                source: e,
            })?;

        let cloud_id = CloudResolver::new(self.api.as_ref(), &scope)
            .resolve_cloud(settings.cloud_id.as_deref())
            .await?;

        let cluster_name = if settings.cluster_name.is_empty() {
            api_service_id.as_str()
        } else {
            settings.cluster_name.as_str()
        };

        let resolved = ClusterResolver::new(self.api.as_ref(), &scope)
            .resolve_cluster(
                &cloud_id,
                settings.cluster_id.as_deref(),
                &api_service_id,
                cluster_name,
            )
            .await?;

        if resolved.is_registered() {
            return Ok(resolved.id().to_string());
        }

        let version = self.cluster_info.cluster_version().await.map_err(|e| {
            RegistrationError::Collaborator {
                reason: format!("Failed to get the Kubernetes version of this cluster: {e}"),
                source: e,
            }
        })?;

        let adopted = matches!(resolved, ResolvedCluster::Adopted(_));
        let record = resolved.into_record();
        let cluster_id = record.id_str().to_string();
        let record_cloud_id = if record.cloud_id.is_empty() {
            cloud_id.clone()
        } else {
            record.cloud_id.clone()
        };

        let refreshed = ClusterRecord {
            id: Some(cluster_id.clone()),
            name: if record.name.is_empty() {
                cluster_name.to_string()
            } else {
                record.name.clone()
            },
            cluster_type: version.distro.clone(),
            cluster_version: version.version.clone(),
            cluster_version_string: version.version_string.clone(),
            connector_capabilities: connector_capabilities(),
            ..Default::default()
        };

        if adopted {
            info!(cluster_id = %cluster_id, "Refreshing adopted cluster record");
            self.api
                .update_cluster(&scope, &record_cloud_id, refreshed.clone())
                .await?;
        }

        let promotion = ClusterRecord {
            cloud_id: record_cloud_id,
            api_service_id,
            namespace: settings.namespace.clone(),
            api_server_url: settings.api_server_url.clone(),
            credential_id: settings.credential_id.clone(),
            ..refreshed
        };
        self.api.promote_to_managed(&scope, promotion).await?;

        info!(cluster_id = %cluster_id, "Cluster registered");
        Ok(cluster_id)
    }

    /// Whether the inventory reports `cluster_id` as managed.
    pub async fn is_cluster_managed(
        &self,
        settings: &Settings,
        cluster_id: &str,
    ) -> Result<bool, RegistrationError> {
        let scope = self.scope(settings).await?;
        info!(cluster_id = %cluster_id, "Checking if cluster is managed");

        let record = self.api.get_managed_cluster(&scope, cluster_id).await?;
        Ok(record.managed_state == ManagedState::Managed)
    }

    /// Unmanage `cluster_id` and remove its record from the private cloud.
    #[instrument(skip_all, fields(account_id = %settings.account_id, cluster_id = %cluster_id))]
    pub async fn unregister(
        &self,
        settings: &Settings,
        cluster_id: &str,
    ) -> Result<(), RegistrationError> {
        let scope = self.scope(settings).await?;
        let resolver = &CloudResolver::new(self.api.as_ref(), &scope);

        let private_cloud = self
            .poll
            .poll(self.sleeper.as_ref(), "ListClouds", move || {
                resolver.find_private_cloud()
            })
            .await
            .map_err(|e| RegistrationError::Timeout {
                reason: "timed out querying the inventory API".to_string(),
                source: e,
            })?;

        let Some(cloud_id) = private_cloud.and_then(|cloud| cloud.id) else {
            warn!("No private cloud found");
            return Err(RegistrationError::NotFound {
                reason: "private cloud does not exist; nothing to unregister".to_string(),
            });
        };

        self.api.unmanage_cluster(&scope, cluster_id).await?;
        self.api.delete_cluster(&scope, &cloud_id, cluster_id).await?;

        info!(cloud_id = %cloud_id, "Cluster unregistered");
        Ok(())
    }

    async fn scope(&self, settings: &Settings) -> Result<AccountScope, RegistrationError> {
        if settings.account_id.is_empty() {
            return Err(RegistrationError::InvalidRequest(
                "account id is required".to_string(),
            ));
        }

        let token = self
            .secrets
            .api_token(&settings.token_ref)
            .await
            .map_err(|e| RegistrationError::Collaborator {
                reason: format!(
                    "Failed to get API token from secret '{}': {e}",
                    settings.token_ref
                ),
                source: e,
            })?;

        Ok(AccountScope::new(
            settings.account_id.clone(),
            ApiToken::new(token),
        ))
    }
}
