//! Wire records exchanged with the topology inventory.
//!
//! State fields are closed enums with an explicit `Unset` variant for the
//! empty string and an `Other` variant that keeps unknown values verbatim,
//! so decisions over them can be matched exhaustively.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type tag for cloud records.
pub const CLOUD_TYPE_TAG: &str = "application/astra-cloud";
/// Schema version sent when creating a cloud.
pub const CLOUD_SCHEMA_VERSION: &str = "1.1";

/// Type tag for cluster records.
pub const CLUSTER_TYPE_TAG: &str = "application/astra-cluster";
/// Schema version sent when creating or updating a cluster.
pub const CLUSTER_SCHEMA_VERSION: &str = "1.6";

/// Type tag for the managed-cluster promotion.
pub const MANAGED_CLUSTER_TYPE_TAG: &str = "application/astra-managedCluster";
/// Schema version sent with the promotion.
pub const MANAGED_CLUSTER_SCHEMA_VERSION: &str = "1.2";

/// Name of the singleton private cloud.
pub const PRIVATE_CLOUD_NAME: &str = "private";

/// Capabilities advertised by the connector.
pub const CONNECTOR_CAPABILITIES: [&str; 2] = ["relayV1", "watcherV1"];

/// Capabilities as owned strings, ready for a record.
pub fn connector_capabilities() -> Vec<String> {
    CONNECTOR_CAPABILITIES.iter().map(|c| c.to_string()).collect()
}

/// Defines a string-backed wire enum with `Unset` and `Other` variants.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            /// Empty on the wire.
            #[default]
            Unset,
            $( $(#[$vmeta])* $variant, )+
            /// A value this crate does not know about.
            Other(String),
        }

        impl $name {
            /// Wire representation.
            pub fn as_str(&self) -> &str {
                match self {
                    Self::Unset => "",
                    $( Self::$variant => $wire, )+
                    Self::Other(value) => value.as_str(),
                }
            }

            /// True for the empty string.
            pub fn is_unset(&self) -> bool {
                matches!(self, Self::Unset)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $(
                    if value == $wire {
                        return Self::$variant;
                    }
                )+
                if value.is_empty() {
                    Self::Unset
                } else {
                    Self::Other(value)
                }
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::from(value.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                match value {
                    $name::Other(value) => value,
                    other => other.as_str().to_string(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Provider kind of a cloud record.
    CloudKind {
        Private => "private",
    }
}

wire_enum! {
    /// Whether a connector tracks the cluster record.
    ///
    /// `Unset` marks legacy records that predate connector installs; they are
    /// never treated as duplicates of a new registration.
    ConnectorInstall {
        Pending => "pending",
        Installed => "installed",
    }
}

wire_enum! {
    /// Lifecycle state of a cluster record.
    ClusterState {
        Pending => "pending",
    }
}

wire_enum! {
    /// Management state of a cluster record.
    ManagedState {
        Managed => "managed",
        Managing => "managing",
        Unmanaged => "unmanaged",
    }
}

/// A cloud (tenant grouping) record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_tag: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(
        rename = "cloudType",
        default,
        skip_serializing_if = "CloudKind::is_unset"
    )]
    pub cloud_kind: CloudKind,
}

impl CloudRecord {
    /// Body for creating the private cloud.
    pub fn private() -> Self {
        Self {
            id: None,
            type_tag: CLOUD_TYPE_TAG.to_string(),
            version: CLOUD_SCHEMA_VERSION.to_string(),
            name: PRIVATE_CLOUD_NAME.to_string(),
            cloud_kind: CloudKind::Private,
        }
    }

    /// The private cloud matches on both kind and name.
    pub fn is_private(&self) -> bool {
        self.cloud_kind == CloudKind::Private && self.name == PRIVATE_CLOUD_NAME
    }
}

/// A cluster record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_tag: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(
        rename = "state",
        default,
        skip_serializing_if = "ClusterState::is_unset"
    )]
    pub cluster_state: ClusterState,

    #[serde(default, skip_serializing_if = "ManagedState::is_unset")]
    pub managed_state: ManagedState,

    #[serde(
        rename = "tridentManagedStateDesired",
        default,
        skip_serializing_if = "ManagedState::is_unset"
    )]
    pub managed_state_desired: ManagedState,

    #[serde(rename = "cloudID", default, skip_serializing_if = "String::is_empty")]
    pub cloud_id: String,

    /// Workload identity fingerprint of the physical cluster.
    #[serde(
        rename = "apiServiceID",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub api_service_id: String,

    #[serde(default, skip_serializing_if = "ConnectorInstall::is_unset")]
    pub connector_install: ConnectorInstall,

    /// Distribution tag (AKS, GKE, OpenShift, ...).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_type: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_version_string: String,

    /// Namespace the connector runs in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(
        rename = "apiServerURL",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub api_server_url: String,

    #[serde(
        rename = "credentialID",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub credential_id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connector_capabilities: Vec<String>,
}

impl ClusterRecord {
    /// Identifier, or an empty string for records not yet created.
    pub fn id_str(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }
}

/// Collection envelope used by list endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_enum_round_trips_known_unknown_and_empty() {
        assert_eq!(ConnectorInstall::from("pending"), ConnectorInstall::Pending);
        assert_eq!(ConnectorInstall::from(""), ConnectorInstall::Unset);
        assert_eq!(
            ConnectorInstall::from("failed"),
            ConnectorInstall::Other("failed".to_string())
        );
        assert_eq!(String::from(ManagedState::Managing), "managing");
        assert_eq!(ManagedState::Other("weird".into()).to_string(), "weird");
    }

    #[test]
    fn test_cluster_record_deserialization() {
        let json = r#"{
            "type": "application/astra-cluster",
            "version": "1.6",
            "id": "c-123",
            "name": "prod-east",
            "state": "pending",
            "managedState": "unmanaged",
            "cloudID": "cloud-1",
            "apiServiceID": "svc-uid",
            "connectorInstall": "pending",
            "clusterType": "openshift",
            "connectorCapabilities": ["relayV1"],
            "somethingNew": true
        }"#;

        let record: ClusterRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id.as_deref(), Some("c-123"));
        assert_eq!(record.cluster_state, ClusterState::Pending);
        assert_eq!(record.managed_state, ManagedState::Unmanaged);
        assert_eq!(record.connector_install, ConnectorInstall::Pending);
        assert_eq!(record.api_service_id, "svc-uid");
        assert_eq!(record.cluster_type, "openshift");
        assert_eq!(record.connector_capabilities, vec!["relayV1"]);
    }

    #[test]
    fn test_legacy_record_has_unset_install_state() {
        let record: ClusterRecord =
            serde_json::from_str(r#"{"id": "old", "apiServiceID": "svc-uid"}"#).unwrap();
        assert!(record.connector_install.is_unset());
        assert!(record.managed_state.is_unset());
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let record = ClusterRecord {
            name: "prod".to_string(),
            connector_install: ConnectorInstall::Pending,
            ..Default::default()
        };

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"name":"prod","connectorInstall":"pending"}"#);
    }

    #[test]
    fn test_private_cloud_body() {
        let json = serde_json::to_value(CloudRecord::private()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "application/astra-cloud",
                "version": "1.1",
                "name": "private",
                "cloudType": "private"
            })
        );
    }

    #[test]
    fn test_is_private_checks_kind_and_name() {
        let mut cloud = CloudRecord::private();
        assert!(cloud.is_private());

        cloud.name = "lab".to_string();
        assert!(!cloud.is_private());

        let azure = CloudRecord {
            name: PRIVATE_CLOUD_NAME.to_string(),
            cloud_kind: CloudKind::from("Azure"),
            ..Default::default()
        };
        assert!(!azure.is_private());
    }
}
