//! Whether an existing cluster record can be used by this cluster.

use thiserror::Error;

use crate::model::{ClusterRecord, ClusterState, ConnectorInstall, ManagedState};

/// Result of evaluating one record against the caller's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Installed and managed; nothing left to do.
    Registered,

    /// Pending and owned by this cluster; ready to promote.
    Promotable,

    /// The record must not be touched.
    Incompatible(Incompatibility),
}

/// Why a record cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Incompatibility {
    #[error("record apiServiceID '{recorded}' does not match this cluster's apiServiceID '{expected}'")]
    IdentityMismatch { recorded: String, expected: String },

    #[error("record has no apiServiceID and connectorInstall is '{0}' rather than pending")]
    MissingIdentity(ConnectorInstall),

    #[error("record was never installed by a connector")]
    NotTracked,

    #[error("record is installed but managedState is '{0}'")]
    InstalledNotManaged(ManagedState),

    #[error("record has unexpected connectorInstall '{0}'")]
    UnexpectedInstallState(ConnectorInstall),

    #[error("record state is '{0}' rather than pending")]
    NotPending(ClusterState),
}

/// Evaluate `record` for the cluster identified by `api_service_id`.
///
/// Rules apply in order; the first that matches decides.
pub fn evaluate(record: &ClusterRecord, api_service_id: &str) -> Registration {
    let recorded = record.api_service_id.as_str();

    if !recorded.is_empty() && recorded != api_service_id {
        return Registration::Incompatible(Incompatibility::IdentityMismatch {
            recorded: recorded.to_string(),
            expected: api_service_id.to_string(),
        });
    }

    if recorded.is_empty() && record.connector_install != ConnectorInstall::Pending {
        return Registration::Incompatible(Incompatibility::MissingIdentity(
            record.connector_install.clone(),
        ));
    }

    match (&record.connector_install, &record.managed_state) {
        (ConnectorInstall::Unset, _) => Registration::Incompatible(Incompatibility::NotTracked),
        (ConnectorInstall::Installed, ManagedState::Managed) => Registration::Registered,
        (ConnectorInstall::Installed, managed) => {
            Registration::Incompatible(Incompatibility::InstalledNotManaged(managed.clone()))
        }
        (other @ ConnectorInstall::Other(_), _) => {
            Registration::Incompatible(Incompatibility::UnexpectedInstallState(other.clone()))
        }
        (ConnectorInstall::Pending, _) => match &record.cluster_state {
            ClusterState::Pending => Registration::Promotable,
            state => Registration::Incompatible(Incompatibility::NotPending(state.clone())),
        },
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const ME: &str = "svc-uid-me";

    fn record(identity: &str, install: &str, managed: &str, state: &str) -> ClusterRecord {
        ClusterRecord {
            id: Some("c-1".to_string()),
            api_service_id: identity.to_string(),
            connector_install: install.into(),
            managed_state: managed.into(),
            cluster_state: state.into(),
            ..Default::default()
        }
    }

    #[rstest]
    #[case::identity_mismatch(
        record("svc-uid-other", "installed", "managed", "pending"),
        Registration::Incompatible(Incompatibility::IdentityMismatch {
            recorded: "svc-uid-other".into(),
            expected: ME.into(),
        })
    )]
    #[case::missing_identity_not_pending(
        record("", "installed", "managed", ""),
        Registration::Incompatible(Incompatibility::MissingIdentity(ConnectorInstall::Installed))
    )]
    #[case::missing_identity_legacy(
        record("", "", "managed", ""),
        Registration::Incompatible(Incompatibility::MissingIdentity(ConnectorInstall::Unset))
    )]
    #[case::never_tracked(
        record(ME, "", "managed", "pending"),
        Registration::Incompatible(Incompatibility::NotTracked)
    )]
    #[case::installed_but_managing(
        record(ME, "installed", "managing", ""),
        Registration::Incompatible(Incompatibility::InstalledNotManaged(ManagedState::Managing))
    )]
    #[case::installed_but_unmanaged(
        record(ME, "installed", "", ""),
        Registration::Incompatible(Incompatibility::InstalledNotManaged(ManagedState::Unset))
    )]
    #[case::registered(record(ME, "installed", "managed", "running"), Registration::Registered)]
    #[case::unexpected_install_state(
        record(ME, "failed", "", "pending"),
        Registration::Incompatible(Incompatibility::UnexpectedInstallState(
            ConnectorInstall::Other("failed".into())
        ))
    )]
    #[case::not_pending(
        record(ME, "pending", "unmanaged", "running"),
        Registration::Incompatible(Incompatibility::NotPending(ClusterState::Other(
            "running".into()
        )))
    )]
    #[case::pending_unset_state(
        record(ME, "pending", "", ""),
        Registration::Incompatible(Incompatibility::NotPending(ClusterState::Unset))
    )]
    #[case::promotable(record(ME, "pending", "unmanaged", "pending"), Registration::Promotable)]
    #[case::promotable_without_identity(
        record("", "pending", "", "pending"),
        Registration::Promotable
    )]
    fn test_evaluate(#[case] record: ClusterRecord, #[case] expected: Registration) {
        assert_eq!(evaluate(&record, ME), expected);
    }

    #[test]
    fn test_identity_mismatch_message_names_both_sides() {
        let Registration::Incompatible(why) =
            evaluate(&record("svc-uid-other", "pending", "", "pending"), ME)
        else {
            panic!("expected incompatibility");
        };
        let message = why.to_string();
        assert!(message.contains("svc-uid-other"));
        assert!(message.contains(ME));
        assert!(message.contains("apiServiceID"));
    }
}
