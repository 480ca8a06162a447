//! Configuration for the registrar.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use registrar_transport::TransportConfig;

use crate::collaborators::ClusterVersion;
use crate::orchestrator::Settings;

/// Inventory host used when none is configured.
pub const DEFAULT_HOST_URL: &str = "https://astra.netapp.io";

/// Secret holding the API token when none is configured.
pub const DEFAULT_TOKEN_REF: &str = "astra-api-token";

/// Registrar configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Inventory base URL, without a trailing slash.
    pub host_url: String,

    pub account_id: String,
    pub cloud_id: Option<String>,
    pub cluster_id: Option<String>,
    pub cluster_name: String,

    /// Name of the secret holding the API token.
    pub token_ref: String,

    /// Directory where secrets are mounted, one subdirectory per secret.
    pub secrets_dir: PathBuf,

    pub skip_tls_validation: bool,

    /// Pin the inventory host name to this address.
    pub host_alias_ip: Option<IpAddr>,

    pub namespace: String,
    pub api_server_url: String,
    pub credential_id: String,

    /// Workload identity of this cluster.
    pub api_service_id: String,

    /// Full Kubernetes version string, e.g. `v1.29.4+k3s1`.
    pub k8s_version: String,

    /// Distribution tag.
    pub distro: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps variable names to values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let account_id = var("REGISTRAR_ACCOUNT_ID").context("REGISTRAR_ACCOUNT_ID is required")?;

        let host_url = var("REGISTRAR_HOST_URL")
            .unwrap_or_else(|| DEFAULT_HOST_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let skip_tls_validation = match var("REGISTRAR_SKIP_TLS_VALIDATION").as_deref() {
            None | Some("false") | Some("0") => false,
            Some("true") | Some("1") => true,
            Some(other) => bail!("REGISTRAR_SKIP_TLS_VALIDATION must be true or false, got '{other}'"),
        };

        let host_alias_ip = var("REGISTRAR_HOST_ALIAS_IP")
            .map(|ip| {
                ip.parse::<IpAddr>()
                    .with_context(|| format!("REGISTRAR_HOST_ALIAS_IP is not an IP address: '{ip}'"))
            })
            .transpose()?;

        Ok(Self {
            host_url,
            account_id,
            cloud_id: var("REGISTRAR_CLOUD_ID"),
            cluster_id: var("REGISTRAR_CLUSTER_ID"),
            cluster_name: var("REGISTRAR_CLUSTER_NAME").unwrap_or_default(),
            token_ref: var("REGISTRAR_TOKEN_REF").unwrap_or_else(|| DEFAULT_TOKEN_REF.to_string()),
            secrets_dir: var("REGISTRAR_SECRETS_DIR")
                .unwrap_or_else(|| "/etc/registrar/secrets".to_string())
                .into(),
            skip_tls_validation,
            host_alias_ip,
            namespace: var("REGISTRAR_NAMESPACE").unwrap_or_default(),
            api_server_url: var("REGISTRAR_API_SERVER_URL").unwrap_or_default(),
            credential_id: var("REGISTRAR_CREDENTIAL_ID").unwrap_or_default(),
            api_service_id: var("REGISTRAR_API_SERVICE_ID").unwrap_or_default(),
            k8s_version: var("REGISTRAR_K8S_VERSION").unwrap_or_default(),
            distro: var("REGISTRAR_DISTRO").unwrap_or_default(),
            log_level: var("REGISTRAR_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Inputs for one registration.
    pub fn settings(&self) -> Settings {
        Settings {
            account_id: self.account_id.clone(),
            cloud_id: self.cloud_id.clone(),
            cluster_id: self.cluster_id.clone(),
            cluster_name: self.cluster_name.clone(),
            token_ref: self.token_ref.clone(),
            namespace: self.namespace.clone(),
            api_server_url: self.api_server_url.clone(),
            credential_id: self.credential_id.clone(),
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            skip_tls_validation: self.skip_tls_validation,
            host_alias_ip: self.host_alias_ip,
            ..Default::default()
        }
    }

    pub fn cluster_version(&self) -> ClusterVersion {
        ClusterVersion {
            version_string: self.k8s_version.clone(),
            version: semantic_version(&self.k8s_version),
            distro: self.distro.clone(),
        }
    }
}

/// `v1.29.4+k3s1` -> `1.29.4`.
fn semantic_version(version_string: &str) -> String {
    let trimmed = version_string.trim_start_matches('v');
    let end = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    trimmed[..end].to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("REGISTRAR_ACCOUNT_ID", "acct-1")]).unwrap();

        assert_eq!(config.host_url, DEFAULT_HOST_URL);
        assert_eq!(config.token_ref, DEFAULT_TOKEN_REF);
        assert_eq!(config.secrets_dir, PathBuf::from("/etc/registrar/secrets"));
        assert!(!config.skip_tls_validation);
        assert!(config.cloud_id.is_none());
        assert!(config.host_alias_ip.is_none());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_account_id_is_required() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("REGISTRAR_ACCOUNT_ID"));
    }

    #[test]
    fn test_host_url_trailing_slash_trimmed() {
        let config = load(&[
            ("REGISTRAR_ACCOUNT_ID", "acct-1"),
            ("REGISTRAR_HOST_URL", "https://inventory.example.com/"),
        ])
        .unwrap();
        assert_eq!(config.host_url, "https://inventory.example.com");
    }

    #[test]
    fn test_transport_settings() {
        let config = load(&[
            ("REGISTRAR_ACCOUNT_ID", "acct-1"),
            ("REGISTRAR_SKIP_TLS_VALIDATION", "true"),
            ("REGISTRAR_HOST_ALIAS_IP", "10.0.0.7"),
        ])
        .unwrap();

        let transport = config.transport();
        assert!(transport.skip_tls_validation);
        assert_eq!(transport.host_alias_ip, Some("10.0.0.7".parse().unwrap()));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(load(&[
            ("REGISTRAR_ACCOUNT_ID", "acct-1"),
            ("REGISTRAR_HOST_ALIAS_IP", "not-an-ip"),
        ])
        .is_err());
        assert!(load(&[
            ("REGISTRAR_ACCOUNT_ID", "acct-1"),
            ("REGISTRAR_SKIP_TLS_VALIDATION", "maybe"),
        ])
        .is_err());
    }

    #[test]
    fn test_semantic_version() {
        assert_eq!(semantic_version("v1.29.4+k3s1"), "1.29.4");
        assert_eq!(semantic_version("v1.27.3-gke.100"), "1.27.3");
        assert_eq!(semantic_version("1.30.0"), "1.30.0");
        assert_eq!(semantic_version(""), "");
    }
}
