//! In-memory inventory for tests and local development.
//!
//! Behaves like the remote service for the operations the registrar uses and
//! records every write so callers can assert on what was (not) written.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use registrar_transport::StatusCode;
use tracing::debug;

use crate::client::{AccountScope, InventoryApi};
use crate::error::RegistrationError;
use crate::model::{
    CloudRecord, ClusterRecord, ClusterState, ConnectorInstall, ManagedState,
    CLUSTER_SCHEMA_VERSION, CLUSTER_TYPE_TAG,
};

/// A write the mock accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockWrite {
    CreateCloud,
    CreateCluster,
    UpdateCluster(String),
    Promote(String),
    Unmanage(String),
    DeleteCluster(String),
}

#[derive(Debug, Default)]
struct Store {
    clouds: Vec<CloudRecord>,
    clusters: Vec<ClusterRecord>,
    writes: Vec<MockWrite>,
}

/// In-memory [`InventoryApi`].
#[derive(Debug, Default)]
pub struct MockInventory {
    store: Mutex<Store>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
    reads: AtomicU64,
}

impl MockInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with 503 until turned off.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Seed a cloud. An id is assigned when missing.
    pub fn insert_cloud(&self, mut cloud: CloudRecord) -> String {
        let id = cloud.id.clone().unwrap_or_else(|| self.next_id("cloud"));
        cloud.id = Some(id.clone());
        self.lock().clouds.push(cloud);
        id
    }

    /// Seed a cluster. An id is assigned when missing.
    pub fn insert_cluster(&self, mut cluster: ClusterRecord) -> String {
        let id = cluster.id.clone().unwrap_or_else(|| self.next_id("cluster"));
        cluster.id = Some(id.clone());
        self.lock().clusters.push(cluster);
        id
    }

    pub fn clouds(&self) -> Vec<CloudRecord> {
        self.lock().clouds.clone()
    }

    pub fn clusters(&self) -> Vec<ClusterRecord> {
        self.lock().clusters.clone()
    }

    pub fn cluster(&self, id: &str) -> Option<ClusterRecord> {
        self.lock()
            .clusters
            .iter()
            .find(|c| c.id.as_deref() == Some(id))
            .cloned()
    }

    /// Writes accepted so far, in order.
    pub fn writes(&self) -> Vec<MockWrite> {
        self.lock().writes.clone()
    }

    /// Number of read calls served.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        // A panic while holding the lock only happens in a failing test.
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}-{n:04}")
    }

    fn check_available(&self, operation: &str) -> Result<(), RegistrationError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistrationError::UnexpectedStatus {
                reason: format!("{operation}: inventory unavailable"),
                status: StatusCode::SERVICE_UNAVAILABLE,
            });
        }
        Ok(())
    }

    fn read(&self, operation: &str) -> Result<(), RegistrationError> {
        self.check_available(operation)?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn not_found(operation: &str, what: &str) -> RegistrationError {
        RegistrationError::NotFound {
            reason: format!("{operation}: {what} not found"),
        }
    }

    fn with_cluster<T>(
        &self,
        operation: &str,
        cluster_id: &str,
        f: impl FnOnce(&mut ClusterRecord) -> T,
    ) -> Result<T, RegistrationError> {
        let mut store = self.lock();
        let cluster = store
            .clusters
            .iter_mut()
            .find(|c| c.id.as_deref() == Some(cluster_id))
            .ok_or_else(|| Self::not_found(operation, cluster_id))?;
        Ok(f(cluster))
    }
}

#[async_trait]
impl InventoryApi for MockInventory {
    async fn get_cloud(
        &self,
        _scope: &AccountScope,
        cloud_id: &str,
    ) -> Result<CloudRecord, RegistrationError> {
        self.read("GetCloud")?;
        self.lock()
            .clouds
            .iter()
            .find(|c| c.id.as_deref() == Some(cloud_id))
            .cloned()
            .ok_or_else(|| Self::not_found("GetCloud", cloud_id))
    }

    async fn list_clouds(
        &self,
        _scope: &AccountScope,
    ) -> Result<Vec<CloudRecord>, RegistrationError> {
        self.read("ListClouds")?;
        Ok(self.clouds())
    }

    async fn create_cloud(
        &self,
        _scope: &AccountScope,
        cloud: CloudRecord,
    ) -> Result<CloudRecord, RegistrationError> {
        self.check_available("CreateCloud")?;
        if cloud.id.is_some() {
            return Err(RegistrationError::InvalidRequest(
                "CreateCloud: cloud id must not be set on create".to_string(),
            ));
        }

        let mut created = cloud;
        created.id = Some(self.next_id("cloud"));

        let mut store = self.lock();
        store.clouds.push(created.clone());
        store.writes.push(MockWrite::CreateCloud);
        debug!(cloud_id = %created.id.as_deref().unwrap_or_default(), "[MOCK] Cloud created");
        Ok(created)
    }

    async fn list_clusters(
        &self,
        _scope: &AccountScope,
    ) -> Result<Vec<ClusterRecord>, RegistrationError> {
        self.read("ListClusters")?;
        Ok(self.clusters())
    }

    async fn get_cluster(
        &self,
        _scope: &AccountScope,
        _cloud_id: &str,
        cluster_id: &str,
    ) -> Result<ClusterRecord, RegistrationError> {
        self.read("GetCluster")?;
        self.cluster(cluster_id)
            .ok_or_else(|| Self::not_found("GetCluster", cluster_id))
    }

    async fn create_cluster(
        &self,
        _scope: &AccountScope,
        cloud_id: &str,
        cluster: ClusterRecord,
    ) -> Result<ClusterRecord, RegistrationError> {
        self.check_available("CreateCluster")?;
        if cluster.id.is_some() {
            return Err(RegistrationError::InvalidRequest(
                "CreateCluster: cluster id must not be set on create".to_string(),
            ));
        }

        let mut created = cluster;
        created.id = Some(self.next_id("cluster"));
        created.type_tag = CLUSTER_TYPE_TAG.to_string();
        created.version = CLUSTER_SCHEMA_VERSION.to_string();
        created.cloud_id = cloud_id.to_string();
        created.cluster_state = ClusterState::Pending;
        created.managed_state = ManagedState::Unmanaged;

        let mut store = self.lock();
        store.clusters.push(created.clone());
        store.writes.push(MockWrite::CreateCluster);
        debug!(cluster_id = %created.id_str(), "[MOCK] Cluster created");
        Ok(created)
    }

    async fn update_cluster(
        &self,
        _scope: &AccountScope,
        _cloud_id: &str,
        cluster: ClusterRecord,
    ) -> Result<(), RegistrationError> {
        self.check_available("UpdateCluster")?;
        let Some(cluster_id) = cluster.id.clone() else {
            return Err(RegistrationError::InvalidRequest(
                "UpdateCluster: cluster id is required".to_string(),
            ));
        };

        self.with_cluster("UpdateCluster", &cluster_id, |existing| {
            existing.name = cluster.name;
            existing.cluster_type = cluster.cluster_type;
            existing.cluster_version = cluster.cluster_version;
            existing.cluster_version_string = cluster.cluster_version_string;
            existing.connector_capabilities = cluster.connector_capabilities;
        })?;
        self.lock().writes.push(MockWrite::UpdateCluster(cluster_id));
        Ok(())
    }

    async fn promote_to_managed(
        &self,
        _scope: &AccountScope,
        cluster: ClusterRecord,
    ) -> Result<(), RegistrationError> {
        self.check_available("CreateManagedCluster")?;
        let cluster_id = cluster.id_str().to_string();
        if cluster_id.is_empty() {
            return Err(RegistrationError::InvalidRequest(
                "CreateManagedCluster: cluster id is required to manage a cluster".to_string(),
            ));
        }

        self.with_cluster("CreateManagedCluster", &cluster_id, |existing| {
            existing.connector_install = ConnectorInstall::Installed;
            existing.managed_state = ManagedState::Managed;
            existing.namespace = cluster.namespace;
            existing.api_server_url = cluster.api_server_url;
            existing.credential_id = cluster.credential_id;
            if !cluster.api_service_id.is_empty() {
                existing.api_service_id = cluster.api_service_id;
            }
        })?;
        self.lock().writes.push(MockWrite::Promote(cluster_id));
        Ok(())
    }

    async fn get_managed_cluster(
        &self,
        _scope: &AccountScope,
        cluster_id: &str,
    ) -> Result<ClusterRecord, RegistrationError> {
        self.read("GetManagedCluster")?;
        self.cluster(cluster_id)
            .ok_or_else(|| Self::not_found("GetManagedCluster", cluster_id))
    }

    async fn unmanage_cluster(
        &self,
        _scope: &AccountScope,
        cluster_id: &str,
    ) -> Result<(), RegistrationError> {
        self.check_available("UnmanageCluster")?;
        self.with_cluster("UnmanageCluster", cluster_id, |existing| {
            existing.managed_state = ManagedState::Unmanaged;
        })?;
        self.lock()
            .writes
            .push(MockWrite::Unmanage(cluster_id.to_string()));
        Ok(())
    }

    async fn delete_cluster(
        &self,
        _scope: &AccountScope,
        _cloud_id: &str,
        cluster_id: &str,
    ) -> Result<(), RegistrationError> {
        self.check_available("RemoveCluster")?;
        let mut store = self.lock();
        let before = store.clusters.len();
        store
            .clusters
            .retain(|c| c.id.as_deref() != Some(cluster_id));
        if store.clusters.len() == before {
            return Err(Self::not_found("RemoveCluster", cluster_id));
        }
        store
            .writes
            .push(MockWrite::DeleteCluster(cluster_id.to_string()));
        Ok(())
    }
}
