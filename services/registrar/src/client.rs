//! Topology inventory API client.
//!
//! Provides typed operations over the remote inventory:
//! - Clouds: get, list, create
//! - Clusters: list, get, create, update, delete
//! - Managed clusters: promote, get, unmanage
//!
//! Every call goes through the retrying transport. Status handling is strict:
//! anything other than the expected status becomes a [`RegistrationError`]
//! carrying a diagnostic in the standard format.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use registrar_transport::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use registrar_transport::{
    Method, Reply, RetryPolicy, RetryingTransport, StatusCode, TransportConfig,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{diagnostic, RegistrationError};
use crate::model::{
    CloudRecord, ClusterRecord, ConnectorInstall, ItemList, ManagedState, CLUSTER_SCHEMA_VERSION,
    CLUSTER_TYPE_TAG, MANAGED_CLUSTER_SCHEMA_VERSION, MANAGED_CLUSTER_TYPE_TAG,
};

/// Idempotent writes (update, promotion) get a few attempts; everything else is single-shot.
const WRITE_ATTEMPTS: u32 = 3;

/// Bearer token. Never printed.
#[derive(Clone)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(****)")
    }
}

/// Account plus the credential used to act on it.
#[derive(Debug, Clone)]
pub struct AccountScope {
    pub account_id: String,
    pub token: ApiToken,
}

impl AccountScope {
    pub fn new(account_id: impl Into<String>, token: ApiToken) -> Self {
        Self {
            account_id: account_id.into(),
            token,
        }
    }
}

/// Inventory resources addressed by this client.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Clouds,
    Cloud(&'a str),
    CloudClusters(&'a str),
    CloudCluster { cloud_id: &'a str, cluster_id: &'a str },
    Clusters,
    ManagedClusters,
    ManagedCluster(&'a str),
}

impl Resource<'_> {
    /// Path below `/accounts/<account>/topology/v1`.
    pub fn path(&self) -> String {
        match self {
            Resource::Clouds => "clouds".to_string(),
            Resource::Cloud(cloud_id) => format!("clouds/{cloud_id}"),
            Resource::CloudClusters(cloud_id) => format!("clouds/{cloud_id}/clusters"),
            Resource::CloudCluster {
                cloud_id,
                cluster_id,
            } => format!("clouds/{cloud_id}/clusters/{cluster_id}"),
            Resource::Clusters => "clusters".to_string(),
            Resource::ManagedClusters => "managedClusters".to_string(),
            Resource::ManagedCluster(cluster_id) => format!("managedClusters/{cluster_id}"),
        }
    }
}

/// Typed inventory operations.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn get_cloud(
        &self,
        scope: &AccountScope,
        cloud_id: &str,
    ) -> Result<CloudRecord, RegistrationError>;

    async fn list_clouds(&self, scope: &AccountScope)
        -> Result<Vec<CloudRecord>, RegistrationError>;

    async fn create_cloud(
        &self,
        scope: &AccountScope,
        cloud: CloudRecord,
    ) -> Result<CloudRecord, RegistrationError>;

    /// Every cluster record in the account.
    async fn list_clusters(
        &self,
        scope: &AccountScope,
    ) -> Result<Vec<ClusterRecord>, RegistrationError>;

    async fn get_cluster(
        &self,
        scope: &AccountScope,
        cloud_id: &str,
        cluster_id: &str,
    ) -> Result<ClusterRecord, RegistrationError>;

    async fn create_cluster(
        &self,
        scope: &AccountScope,
        cloud_id: &str,
        cluster: ClusterRecord,
    ) -> Result<ClusterRecord, RegistrationError>;

    async fn update_cluster(
        &self,
        scope: &AccountScope,
        cloud_id: &str,
        cluster: ClusterRecord,
    ) -> Result<(), RegistrationError>;

    /// Transition a pending cluster to installed and managed.
    async fn promote_to_managed(
        &self,
        scope: &AccountScope,
        cluster: ClusterRecord,
    ) -> Result<(), RegistrationError>;

    async fn get_managed_cluster(
        &self,
        scope: &AccountScope,
        cluster_id: &str,
    ) -> Result<ClusterRecord, RegistrationError>;

    async fn unmanage_cluster(
        &self,
        scope: &AccountScope,
        cluster_id: &str,
    ) -> Result<(), RegistrationError>;

    async fn delete_cluster(
        &self,
        scope: &AccountScope,
        cloud_id: &str,
        cluster_id: &str,
    ) -> Result<(), RegistrationError>;
}

/// Which statuses a call accepts.
#[derive(Debug, Clone, Copy)]
enum Expect {
    Exactly(StatusCode),
    /// Any 2xx up to and including 204.
    UpToNoContent,
}

impl Expect {
    fn accepts(&self, status: StatusCode) -> bool {
        match self {
            Expect::Exactly(expected) => status == *expected,
            Expect::UpToNoContent => status.is_success() && status <= StatusCode::NO_CONTENT,
        }
    }
}

/// One request description.
struct Call<'a> {
    operation: &'static str,
    method: Method,
    resource: Resource<'a>,
    body: Option<Bytes>,
    expect: Expect,
    /// Treat 404 as [`RegistrationError::NotFound`].
    not_found: bool,
    policy: RetryPolicy,
}

/// HTTP implementation of [`InventoryApi`].
#[derive(Debug, Clone)]
pub struct InventoryClient {
    transport: RetryingTransport,
    host_url: String,
    reads: RetryPolicy,
    writes: RetryPolicy,
}

impl InventoryClient {
    /// Create a client for `host_url` with its own transport.
    pub fn new(host_url: &str, config: &TransportConfig) -> Result<Self, RegistrationError> {
        let transport = RetryingTransport::new(host_url, config).map_err(|e| {
            RegistrationError::InvalidRequest(format!("Failed to set up HTTP client: {e}"))
        })?;
        Ok(Self::with_transport(host_url, transport))
    }

    /// Create a client over an existing transport.
    pub fn with_transport(host_url: &str, transport: RetryingTransport) -> Self {
        Self {
            transport,
            host_url: host_url.trim_end_matches('/').to_string(),
            reads: RetryPolicy::single(),
            writes: RetryPolicy::with_attempts(WRITE_ATTEMPTS),
        }
    }

    /// Override the retry policies.
    pub fn with_policies(mut self, reads: RetryPolicy, writes: RetryPolicy) -> Self {
        self.reads = reads;
        self.writes = writes;
        self
    }

    /// Full URL of a resource.
    pub fn url(&self, scope: &AccountScope, resource: Resource<'_>) -> String {
        format!(
            "{}/accounts/{}/topology/v1/{}",
            self.host_url,
            scope.account_id,
            resource.path()
        )
    }

    fn headers(&self, scope: &AccountScope) -> Result<HeaderMap, RegistrationError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", scope.token.expose()))
            .map_err(|_| {
                RegistrationError::InvalidRequest(
                    "API token contains characters not allowed in a header".to_string(),
                )
            })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    fn encode<T: Serialize>(operation: &str, value: &T) -> Result<Bytes, RegistrationError> {
        serde_json::to_vec(value).map(Bytes::from).map_err(|e| {
            RegistrationError::InvalidRequest(format!(
                "{operation}: Failed to marshal request body: {e}"
            ))
        })
    }

    /// Send a call and check its status.
    async fn send(
        &self,
        scope: &AccountScope,
        call: Call<'_>,
    ) -> Result<(String, Reply), RegistrationError> {
        let url = self.url(scope, call.resource);
        let action = format!("make {} call", call.method);
        let headers = self.headers(scope)?;

        debug!(operation = call.operation, method = %call.method, url = %url, "Calling inventory");

        let reply = self
            .transport
            .execute(call.method, &url, call.body, &headers, &call.policy)
            .await
            .map_err(|e| RegistrationError::Transport {
                reason: diagnostic(call.operation, &action, &url, None, Some(&e), None),
                source: e,
            })?;

        if call.not_found && reply.status == StatusCode::NOT_FOUND {
            return Err(RegistrationError::NotFound {
                reason: diagnostic(
                    call.operation,
                    &action,
                    &url,
                    Some(reply.status),
                    Some(&"resource not found"),
                    None,
                ),
            });
        }

        if !call.expect.accepts(reply.status) {
            return Err(RegistrationError::UnexpectedStatus {
                reason: diagnostic(
                    call.operation,
                    &action,
                    &url,
                    Some(reply.status),
                    None,
                    Some(&*reply.text()),
                ),
                status: reply.status,
            });
        }

        Ok((url, reply))
    }

    fn decode<T: DeserializeOwned>(
        operation: &str,
        method: &Method,
        url: &str,
        reply: &Reply,
    ) -> Result<T, RegistrationError> {
        reply.json().map_err(|e| RegistrationError::Decode {
            reason: diagnostic(
                operation,
                &format!("unmarshal response from {method} call"),
                url,
                Some(reply.status),
                Some(&e),
                Some(&*reply.text()),
            ),
            source: e,
        })
    }

    async fn read<T: DeserializeOwned>(
        &self,
        scope: &AccountScope,
        operation: &'static str,
        resource: Resource<'_>,
        not_found: bool,
    ) -> Result<T, RegistrationError> {
        let (url, reply) = self
            .send(
                scope,
                Call {
                    operation,
                    method: Method::GET,
                    resource,
                    body: None,
                    expect: Expect::Exactly(StatusCode::OK),
                    not_found,
                    policy: self.reads,
                },
            )
            .await?;
        Self::decode(operation, &Method::GET, &url, &reply)
    }
}

#[async_trait]
impl InventoryApi for InventoryClient {
    async fn get_cloud(
        &self,
        scope: &AccountScope,
        cloud_id: &str,
    ) -> Result<CloudRecord, RegistrationError> {
        self.read(scope, "GetCloud", Resource::Cloud(cloud_id), true)
            .await
    }

    async fn list_clouds(
        &self,
        scope: &AccountScope,
    ) -> Result<Vec<CloudRecord>, RegistrationError> {
        let list: ItemList<CloudRecord> =
            self.read(scope, "ListClouds", Resource::Clouds, false).await?;
        Ok(list.items)
    }

    async fn create_cloud(
        &self,
        scope: &AccountScope,
        cloud: CloudRecord,
    ) -> Result<CloudRecord, RegistrationError> {
        const OP: &str = "CreateCloud";
        if let Some(id) = &cloud.id {
            return Err(RegistrationError::InvalidRequest(format!(
                "{OP}: cloud id '{id}' must not be set on create"
            )));
        }

        info!(cloud_type = %cloud.cloud_kind, name = %cloud.name, "Creating cloud");
        let (url, reply) = self
            .send(
                scope,
                Call {
                    operation: OP,
                    method: Method::POST,
                    resource: Resource::Clouds,
                    body: Some(Self::encode(OP, &cloud)?),
                    expect: Expect::Exactly(StatusCode::CREATED),
                    not_found: false,
                    policy: self.reads,
                },
            )
            .await?;
        Self::decode(OP, &Method::POST, &url, &reply)
    }

    async fn list_clusters(
        &self,
        scope: &AccountScope,
    ) -> Result<Vec<ClusterRecord>, RegistrationError> {
        let list: ItemList<ClusterRecord> = self
            .read(scope, "ListClusters", Resource::Clusters, false)
            .await?;
        Ok(list.items)
    }

    async fn get_cluster(
        &self,
        scope: &AccountScope,
        cloud_id: &str,
        cluster_id: &str,
    ) -> Result<ClusterRecord, RegistrationError> {
        self.read(
            scope,
            "GetCluster",
            Resource::CloudCluster {
                cloud_id,
                cluster_id,
            },
            true,
        )
        .await
    }

    async fn create_cluster(
        &self,
        scope: &AccountScope,
        cloud_id: &str,
        mut cluster: ClusterRecord,
    ) -> Result<ClusterRecord, RegistrationError> {
        const OP: &str = "CreateCluster";
        if let Some(id) = &cluster.id {
            return Err(RegistrationError::InvalidRequest(format!(
                "{OP}: cluster id '{id}' must not be set on create"
            )));
        }
        cluster.type_tag = CLUSTER_TYPE_TAG.to_string();
        cluster.version = CLUSTER_SCHEMA_VERSION.to_string();

        let (url, reply) = self
            .send(
                scope,
                Call {
                    operation: OP,
                    method: Method::POST,
                    resource: Resource::CloudClusters(cloud_id),
                    body: Some(Self::encode(OP, &cluster)?),
                    expect: Expect::Exactly(StatusCode::CREATED),
                    not_found: false,
                    // A retried POST could add a second record; the next
                    // registration finds a committed one by identity instead.
                    policy: self.reads,
                },
            )
            .await?;

        let created: ClusterRecord = Self::decode(OP, &Method::POST, &url, &reply)?;
        if created.id_str().is_empty() {
            return Err(RegistrationError::UnexpectedStatus {
                reason: diagnostic(
                    OP,
                    "get clusterId in response from POST call",
                    &url,
                    Some(reply.status),
                    None,
                    Some(&*reply.text()),
                ),
                status: reply.status,
            });
        }

        info!(cluster_id = %created.id_str(), name = %created.name, "Cluster record created");
        Ok(created)
    }

    async fn update_cluster(
        &self,
        scope: &AccountScope,
        cloud_id: &str,
        mut cluster: ClusterRecord,
    ) -> Result<(), RegistrationError> {
        const OP: &str = "UpdateCluster";
        let Some(cluster_id) = cluster.id.take() else {
            return Err(RegistrationError::InvalidRequest(format!(
                "{OP}: cluster id is required"
            )));
        };
        cluster.type_tag = CLUSTER_TYPE_TAG.to_string();
        cluster.version = CLUSTER_SCHEMA_VERSION.to_string();

        self.send(
            scope,
            Call {
                operation: OP,
                method: Method::PUT,
                resource: Resource::CloudCluster {
                    cloud_id,
                    cluster_id: &cluster_id,
                },
                body: Some(Self::encode(OP, &cluster)?),
                expect: Expect::UpToNoContent,
                not_found: false,
                policy: self.writes,
            },
        )
        .await?;

        info!(cluster_id = %cluster_id, "Cluster record updated");
        Ok(())
    }

    async fn promote_to_managed(
        &self,
        scope: &AccountScope,
        mut cluster: ClusterRecord,
    ) -> Result<(), RegistrationError> {
        const OP: &str = "CreateManagedCluster";
        if cluster.id_str().is_empty() {
            return Err(RegistrationError::InvalidRequest(format!(
                "{OP}: cluster id is required to manage a cluster"
            )));
        }
        cluster.type_tag = MANAGED_CLUSTER_TYPE_TAG.to_string();
        cluster.version = MANAGED_CLUSTER_SCHEMA_VERSION.to_string();
        cluster.managed_state_desired = ManagedState::Managed;
        cluster.connector_install = ConnectorInstall::Installed;

        self.send(
            scope,
            Call {
                operation: OP,
                method: Method::POST,
                resource: Resource::ManagedClusters,
                body: Some(Self::encode(OP, &cluster)?),
                expect: Expect::Exactly(StatusCode::CREATED),
                not_found: false,
                policy: self.writes,
            },
        )
        .await?;

        info!(cluster_id = %cluster.id_str(), "Cluster promoted to managed");
        Ok(())
    }

    async fn get_managed_cluster(
        &self,
        scope: &AccountScope,
        cluster_id: &str,
    ) -> Result<ClusterRecord, RegistrationError> {
        self.read(
            scope,
            "GetManagedCluster",
            Resource::ManagedCluster(cluster_id),
            true,
        )
        .await
    }

    async fn unmanage_cluster(
        &self,
        scope: &AccountScope,
        cluster_id: &str,
    ) -> Result<(), RegistrationError> {
        self.send(
            scope,
            Call {
                operation: "UnmanageCluster",
                method: Method::DELETE,
                resource: Resource::ManagedCluster(cluster_id),
                body: None,
                expect: Expect::Exactly(StatusCode::NO_CONTENT),
                not_found: false,
                policy: self.reads,
            },
        )
        .await?;

        info!(cluster_id = %cluster_id, "Cluster unmanaged");
        Ok(())
    }

    async fn delete_cluster(
        &self,
        scope: &AccountScope,
        cloud_id: &str,
        cluster_id: &str,
    ) -> Result<(), RegistrationError> {
        self.send(
            scope,
            Call {
                operation: "RemoveCluster",
                method: Method::DELETE,
                resource: Resource::CloudCluster {
                    cloud_id,
                    cluster_id,
                },
                body: None,
                expect: Expect::Exactly(StatusCode::NO_CONTENT),
                not_found: false,
                policy: self.reads,
            },
        )
        .await?;

        info!(cluster_id = %cluster_id, cloud_id = %cloud_id, "Cluster record removed");
        Ok(())
    }
}
