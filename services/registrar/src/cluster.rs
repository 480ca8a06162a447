//! Cluster resolution: find, adopt, or create the record for this cluster.
//!
//! Without a configured id the workload identity is the key: an existing
//! record tracked by a connector is reused, otherwise a pending one is
//! created. A configured id is an explicit assertion and is never replaced
//! by a new record.

use tracing::{info, warn};

use crate::client::{AccountScope, InventoryApi};
use crate::compat::{evaluate, Registration};
use crate::error::RegistrationError;
use crate::model::{connector_capabilities, ClusterRecord, ConnectorInstall};

/// Outcome of cluster resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedCluster {
    /// Already installed and managed.
    Registered(ClusterRecord),
    /// An existing pending record owned by this cluster.
    Adopted(ClusterRecord),
    /// A pending record created by this call.
    Created(ClusterRecord),
}

impl ResolvedCluster {
    pub fn id(&self) -> &str {
        self.record().id_str()
    }

    pub fn record(&self) -> &ClusterRecord {
        match self {
            ResolvedCluster::Registered(record)
            | ResolvedCluster::Adopted(record)
            | ResolvedCluster::Created(record) => record,
        }
    }

    pub fn into_record(self) -> ClusterRecord {
        match self {
            ResolvedCluster::Registered(record)
            | ResolvedCluster::Adopted(record)
            | ResolvedCluster::Created(record) => record,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, ResolvedCluster::Registered(_))
    }
}

/// Resolves the cluster record for a registration.
pub struct ClusterResolver<'a> {
    api: &'a dyn InventoryApi,
    scope: &'a AccountScope,
}

impl<'a> ClusterResolver<'a> {
    pub fn new(api: &'a dyn InventoryApi, scope: &'a AccountScope) -> Self {
        Self { api, scope }
    }

    /// Resolve the record for the cluster identified by `api_service_id`.
    pub async fn resolve_cluster(
        &self,
        cloud_id: &str,
        configured: Option<&str>,
        api_service_id: &str,
        cluster_name: &str,
    ) -> Result<ResolvedCluster, RegistrationError> {
        if api_service_id.is_empty() {
            return Err(RegistrationError::InvalidRequest(
                "apiServiceID of this cluster is empty; cannot resolve its cluster record"
                    .to_string(),
            ));
        }

        match configured.filter(|id| !id.is_empty()) {
            Some(cluster_id) => {
                self.resolve_configured(cloud_id, cluster_id, api_service_id)
                    .await
            }
            None => {
                self.resolve_by_identity(cloud_id, api_service_id, cluster_name)
                    .await
            }
        }
    }

    /// A record tracked by a connector that carries `api_service_id`.
    ///
    /// Records with an empty `connectorInstall` predate connector installs
    /// and are skipped.
    pub async fn find_duplicate_by_identity(
        &self,
        api_service_id: &str,
    ) -> Result<Option<ClusterRecord>, RegistrationError> {
        let clusters = self.api.list_clusters(self.scope).await?;
        Ok(clusters.into_iter().find(|cluster| {
            cluster.api_service_id == api_service_id && !cluster.connector_install.is_unset()
        }))
    }

    /// A record other than `exclude_id` tracked by a connector that carries
    /// `api_service_id`.
    pub async fn find_conflicting_duplicate(
        &self,
        api_service_id: &str,
        exclude_id: &str,
    ) -> Result<Option<ClusterRecord>, RegistrationError> {
        let clusters = self.api.list_clusters(self.scope).await?;
        Ok(clusters.into_iter().find(|cluster| {
            cluster.id_str() != exclude_id
                && cluster.api_service_id == api_service_id
                && !cluster.connector_install.is_unset()
        }))
    }

    async fn resolve_by_identity(
        &self,
        cloud_id: &str,
        api_service_id: &str,
        cluster_name: &str,
    ) -> Result<ResolvedCluster, RegistrationError> {
        if let Some(existing) = self.find_duplicate_by_identity(api_service_id).await? {
            info!(
                cluster_id = %existing.id_str(),
                api_service_id = %api_service_id,
                "Found existing cluster record for this cluster"
            );
            return classify(existing, api_service_id);
        }

        let pending = ClusterRecord {
            name: cluster_name.to_string(),
            cloud_id: cloud_id.to_string(),
            api_service_id: api_service_id.to_string(),
            connector_install: ConnectorInstall::Pending,
            connector_capabilities: connector_capabilities(),
            ..Default::default()
        };
        let created = self.api.create_cluster(self.scope, cloud_id, pending).await?;
        Ok(ResolvedCluster::Created(created))
    }

    async fn resolve_configured(
        &self,
        cloud_id: &str,
        cluster_id: &str,
        api_service_id: &str,
    ) -> Result<ResolvedCluster, RegistrationError> {
        let record = match self.api.get_cluster(self.scope, cloud_id, cluster_id).await {
            Ok(record) => record,
            Err(RegistrationError::NotFound { .. }) => {
                return Err(RegistrationError::NotFound {
                    reason: format!("cluster '{cluster_id}' does not exist in cloud '{cloud_id}'"),
                })
            }
            Err(e) => return Err(e),
        };

        let resolved = classify(record, api_service_id)?;
        if resolved.is_registered() {
            return Ok(resolved);
        }

        if let Some(other) = self
            .find_conflicting_duplicate(api_service_id, cluster_id)
            .await?
        {
            warn!(
                configured = %cluster_id,
                found = %other.id_str(),
                "Configured cluster id conflicts with the record for this cluster"
            );
            return Err(RegistrationError::IdentityConflict(format!(
                "apiServiceID matches but the clusterId does not: apiServiceID '{}' belongs \
                 to clusterId '{}', configured clusterId is '{}'",
                api_service_id,
                other.id_str(),
                cluster_id
            )));
        }

        Ok(resolved)
    }
}

/// Map a record's evaluation onto a resolution.
fn classify(record: ClusterRecord, api_service_id: &str) -> Result<ResolvedCluster, RegistrationError> {
    match evaluate(&record, api_service_id) {
        Registration::Registered => {
            info!(cluster_id = %record.id_str(), "Cluster is already registered");
            Ok(ResolvedCluster::Registered(record))
        }
        Registration::Promotable => Ok(ResolvedCluster::Adopted(record)),
        Registration::Incompatible(incompatibility) => {
            let cluster_id = record.id_str().to_string();
            Err(RegistrationError::Incompatible {
                reason: format!(
                    "clusterId '{cluster_id}' is incompatible with this cluster: {incompatibility}"
                ),
                cluster_id,
                incompatibility,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiToken;
    use crate::compat::Incompatibility;
    use crate::mock::{MockInventory, MockWrite};
    use crate::model::{ClusterState, ManagedState};

    const IDENTITY: &str = "svc-uid-1";

    fn scope() -> AccountScope {
        AccountScope::new("acct", ApiToken::new("tok"))
    }

    fn record(api_service_id: &str, install: ConnectorInstall, managed: ManagedState) -> ClusterRecord {
        ClusterRecord {
            name: "prod".into(),
            cloud_id: "cloud-1".into(),
            api_service_id: api_service_id.into(),
            connector_install: install,
            managed_state: managed,
            cluster_state: ClusterState::Pending,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_creates_pending_record_when_none_exists() {
        let inventory = MockInventory::new();
        let scope = scope();

        let resolved = ClusterResolver::new(&inventory, &scope)
            .resolve_cluster("cloud-1", None, IDENTITY, "prod")
            .await
            .unwrap();

        let ResolvedCluster::Created(created) = resolved else {
            panic!("expected a created record");
        };
        assert_eq!(created.connector_install, ConnectorInstall::Pending);
        assert_eq!(created.api_service_id, IDENTITY);
        assert_eq!(created.cloud_id, "cloud-1");
        assert_eq!(inventory.writes(), vec![MockWrite::CreateCluster]);
    }

    #[tokio::test]
    async fn test_legacy_record_is_not_a_duplicate() {
        let inventory = MockInventory::new();
        inventory.insert_cluster(record(IDENTITY, ConnectorInstall::Unset, ManagedState::Managed));
        let scope = scope();
        let resolver = ClusterResolver::new(&inventory, &scope);

        assert!(resolver
            .find_duplicate_by_identity(IDENTITY)
            .await
            .unwrap()
            .is_none());

        let resolved = resolver
            .resolve_cluster("cloud-1", None, IDENTITY, "prod")
            .await
            .unwrap();
        assert!(matches!(resolved, ResolvedCluster::Created(_)));
    }

    #[tokio::test]
    async fn test_pending_duplicate_is_adopted() {
        let inventory = MockInventory::new();
        let id = inventory.insert_cluster(record(
            IDENTITY,
            ConnectorInstall::Pending,
            ManagedState::Unmanaged,
        ));
        let scope = scope();

        let resolved = ClusterResolver::new(&inventory, &scope)
            .resolve_cluster("cloud-1", None, IDENTITY, "prod")
            .await
            .unwrap();

        assert!(matches!(resolved, ResolvedCluster::Adopted(_)));
        assert_eq!(resolved.id(), id);
        assert!(inventory.writes().is_empty());
    }

    #[tokio::test]
    async fn test_incompatible_duplicate_is_terminal() {
        let inventory = MockInventory::new();
        inventory.insert_cluster(record(
            IDENTITY,
            ConnectorInstall::Installed,
            ManagedState::Managing,
        ));
        let scope = scope();

        let err = ClusterResolver::new(&inventory, &scope)
            .resolve_cluster("cloud-1", None, IDENTITY, "prod")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RegistrationError::Incompatible {
                incompatibility: Incompatibility::InstalledNotManaged(ManagedState::Managing),
                ..
            }
        ));
        assert!(err.is_terminal());
        assert!(inventory.writes().is_empty());
    }

    #[tokio::test]
    async fn test_configured_id_must_exist() {
        let inventory = MockInventory::new();
        let scope = scope();

        let err = ClusterResolver::new(&inventory, &scope)
            .resolve_cluster("cloud-1", Some("cluster-gone"), IDENTITY, "prod")
            .await
            .unwrap_err();

        assert!(matches!(err, RegistrationError::NotFound { .. }));
        assert!(err.reason().contains("cluster-gone"));
        assert!(inventory.writes().is_empty());
    }

    #[tokio::test]
    async fn test_configured_id_conflicts_with_identity_record() {
        let inventory = MockInventory::new();
        let configured = inventory.insert_cluster(record(
            "",
            ConnectorInstall::Pending,
            ManagedState::Unmanaged,
        ));
        let other = inventory.insert_cluster(record(
            IDENTITY,
            ConnectorInstall::Pending,
            ManagedState::Unmanaged,
        ));
        let scope = scope();

        let err = ClusterResolver::new(&inventory, &scope)
            .resolve_cluster("cloud-1", Some(&configured), IDENTITY, "prod")
            .await
            .unwrap_err();

        assert!(matches!(err, RegistrationError::IdentityConflict(_)));
        assert!(err.reason().contains("apiServiceID matches but the clusterId does not"));
        assert!(err.reason().contains(&other));
    }

    #[tokio::test]
    async fn test_conflict_found_when_configured_record_is_listed_first() {
        let inventory = MockInventory::new();
        let configured = inventory.insert_cluster(record(
            IDENTITY,
            ConnectorInstall::Pending,
            ManagedState::Unmanaged,
        ));
        let other = inventory.insert_cluster(record(
            IDENTITY,
            ConnectorInstall::Pending,
            ManagedState::Unmanaged,
        ));
        let scope = scope();

        let err = ClusterResolver::new(&inventory, &scope)
            .resolve_cluster("cloud-1", Some(&configured), IDENTITY, "prod")
            .await
            .unwrap_err();

        assert!(matches!(err, RegistrationError::IdentityConflict(_)));
        assert!(err.reason().contains(&other));
        assert!(inventory.writes().is_empty());
    }

    #[tokio::test]
    async fn test_configured_record_with_own_identity_is_adopted() {
        let inventory = MockInventory::new();
        let configured = inventory.insert_cluster(record(
            IDENTITY,
            ConnectorInstall::Pending,
            ManagedState::Unmanaged,
        ));
        inventory.insert_cluster(record(IDENTITY, ConnectorInstall::Unset, ManagedState::Managed));
        let scope = scope();

        let resolved = ClusterResolver::new(&inventory, &scope)
            .resolve_cluster("cloud-1", Some(&configured), IDENTITY, "prod")
            .await
            .unwrap();

        assert!(matches!(resolved, ResolvedCluster::Adopted(_)));
        assert_eq!(resolved.id(), configured);
    }

    #[tokio::test]
    async fn test_empty_identity_is_rejected() {
        let inventory = MockInventory::new();
        let scope = scope();

        let err = ClusterResolver::new(&inventory, &scope)
            .resolve_cluster("cloud-1", None, "", "prod")
            .await
            .unwrap_err();

        assert!(matches!(err, RegistrationError::InvalidRequest(_)));
        assert_eq!(inventory.read_count(), 0);
    }
}
