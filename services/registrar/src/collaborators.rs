//! Local collaborators the registration flow depends on.
//!
//! - Secret lookup for the inventory API token
//! - Local cluster version and distribution tag
//! - The workload identity fingerprint used for de-duplication
//!
//! Implementations here are thin: a mounted-secret reader and static values
//! supplied through configuration.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Key holding the token inside a secret.
pub const API_TOKEN_KEY: &str = "apiToken";

/// Collaborator failures.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("secret '{0}' not found")]
    NotFound(String),

    #[error("secret '{name}' is malformed: {detail}")]
    Malformed { name: String, detail: String },

    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Resolves a secret reference to a bearer token.
#[async_trait]
pub trait SecretLookup: Send + Sync {
    async fn api_token(&self, secret_ref: &str) -> Result<String, CollaboratorError>;
}

/// Version information about the local cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterVersion {
    /// Full version string as reported by the API server.
    pub version_string: String,

    /// Semantic version, e.g. `1.29.3`.
    pub version: String,

    /// Distribution tag.
    pub distro: String,
}

/// Reports the local cluster's version and distribution.
#[async_trait]
pub trait LocalClusterInfo: Send + Sync {
    async fn cluster_version(&self) -> Result<ClusterVersion, CollaboratorError>;
}

/// Supplies the stable identity fingerprint of the local cluster.
#[async_trait]
pub trait WorkloadIdentity: Send + Sync {
    async fn api_service_id(&self) -> Result<String, CollaboratorError>;
}

/// Reads tokens from secrets mounted as `<root>/<name>/apiToken`.
#[derive(Debug, Clone)]
pub struct FileSecretLookup {
    root: PathBuf,
}

impl FileSecretLookup {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SecretLookup for FileSecretLookup {
    async fn api_token(&self, secret_ref: &str) -> Result<String, CollaboratorError> {
        let dir = self.root.join(secret_ref);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(CollaboratorError::NotFound(secret_ref.to_string()));
        }

        let path = dir.join(API_TOKEN_KEY);
        debug!(path = %path.display(), "Reading API token");

        let token = match tokio::fs::read_to_string(&path).await {
            Ok(token) => token,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CollaboratorError::Malformed {
                    name: secret_ref.to_string(),
                    detail: format!("missing '{API_TOKEN_KEY}' key"),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let token = token.trim();
        if token.is_empty() {
            return Err(CollaboratorError::Malformed {
                name: secret_ref.to_string(),
                detail: format!("'{API_TOKEN_KEY}' is empty"),
            });
        }

        Ok(token.to_string())
    }
}

/// Cluster info fixed at startup.
#[derive(Debug, Clone)]
pub struct StaticClusterInfo(pub ClusterVersion);

#[async_trait]
impl LocalClusterInfo for StaticClusterInfo {
    async fn cluster_version(&self) -> Result<ClusterVersion, CollaboratorError> {
        Ok(self.0.clone())
    }
}

/// Identity fixed at startup.
#[derive(Debug, Clone)]
pub struct StaticWorkloadIdentity(pub String);

#[async_trait]
impl WorkloadIdentity for StaticWorkloadIdentity {
    async fn api_service_id(&self) -> Result<String, CollaboratorError> {
        if self.0.is_empty() {
            return Err(CollaboratorError::Unavailable(
                "workload identity is not configured".to_string(),
            ));
        }
        Ok(self.0.clone())
    }
}

/// Secret lookup returning a fixed token.
#[derive(Debug, Clone)]
pub struct StaticSecret(pub String);

#[async_trait]
impl SecretLookup for StaticSecret {
    async fn api_token(&self, _secret_ref: &str) -> Result<String, CollaboratorError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_secret_lookup_reads_token() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("astra-token")).unwrap();
        std::fs::write(dir.path().join("astra-token/apiToken"), "tok-123\n").unwrap();

        let lookup = FileSecretLookup::new(dir.path());
        assert_eq!(lookup.api_token("astra-token").await.unwrap(), "tok-123");
    }

    #[tokio::test]
    async fn test_file_secret_lookup_missing_secret() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = FileSecretLookup::new(dir.path());

        let err = lookup.api_token("absent").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::NotFound(name) if name == "absent"));
    }

    #[tokio::test]
    async fn test_file_secret_lookup_missing_key_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("astra-token")).unwrap();
        std::fs::write(dir.path().join("astra-token/token"), "tok").unwrap();

        let lookup = FileSecretLookup::new(dir.path());
        let err = lookup.api_token("astra-token").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_file_secret_lookup_empty_token_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("astra-token")).unwrap();
        std::fs::write(dir.path().join("astra-token/apiToken"), "  \n").unwrap();

        let lookup = FileSecretLookup::new(dir.path());
        let err = lookup.api_token("astra-token").await.unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }

    #[tokio::test]
    async fn test_static_identity_must_be_set() {
        assert!(StaticWorkloadIdentity(String::new())
            .api_service_id()
            .await
            .is_err());
        assert_eq!(
            StaticWorkloadIdentity("uid".into())
                .api_service_id()
                .await
                .unwrap(),
            "uid"
        );
    }
}
