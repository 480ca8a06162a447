//! Registration errors.
//!
//! Every error carries a `reason`: a human-readable diagnostic meant to be
//! copied verbatim into an operator-facing status field. It stays stable even
//! when the error is later wrapped.

use std::fmt::Display;

use registrar_transport::{PollTimeout, StatusCode, TransportError};
use thiserror::Error;

use crate::collaborators::CollaboratorError;
use crate::compat::Incompatibility;

/// Errors returned by registration operations.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// No response after every transport attempt.
    #[error("{reason}")]
    Transport {
        reason: String,
        #[source]
        source: TransportError,
    },

    /// The inventory answered with a status other than the expected one.
    #[error("{reason}")]
    UnexpectedStatus { reason: String, status: StatusCode },

    /// The addressed record does not exist.
    #[error("{reason}")]
    NotFound { reason: String },

    /// A response body could not be decoded.
    #[error("{reason}")]
    Decode {
        reason: String,
        #[source]
        source: serde_json::Error,
    },

    /// Rejected locally; nothing was sent.
    #[error("{0}")]
    InvalidRequest(String),

    /// An existing record cannot be used by this cluster.
    #[error("{reason}")]
    Incompatible {
        reason: String,
        cluster_id: String,
        incompatibility: Incompatibility,
    },

    /// The configured cluster id and the identity-derived record disagree.
    #[error("{0}")]
    IdentityConflict(String),

    /// A local collaborator (secret, cluster info, identity) failed.
    #[error("{reason}")]
    Collaborator {
        reason: String,
        #[source]
        source: CollaboratorError,
    },

    /// Waiting for the inventory to converge ran out of time.
    #[error("{reason}")]
    Timeout {
        reason: String,
        #[source]
        source: PollTimeout,
    },
}

impl RegistrationError {
    /// Operator-facing diagnostic.
    pub fn reason(&self) -> &str {
        match self {
            Self::Transport { reason, .. }
            | Self::UnexpectedStatus { reason, .. }
            | Self::NotFound { reason }
            | Self::Decode { reason, .. }
            | Self::Incompatible { reason, .. }
            | Self::Collaborator { reason, .. }
            | Self::Timeout { reason, .. } => reason.as_str(),
            Self::InvalidRequest(reason) | Self::IdentityConflict(reason) => reason.as_str(),
        }
    }

    /// Retrying will not change the outcome; an operator has to act.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::InvalidRequest(_)
                | Self::Incompatible { .. }
                | Self::IdentityConflict(_)
        )
    }
}

/// Format a request diagnostic:
/// `<operation>: Failed to <action> to <url> with status <status>[: <err>][; Response Body: <body>]`.
pub fn diagnostic(
    operation: &str,
    action: &str,
    url: &str,
    status: Option<StatusCode>,
    err: Option<&dyn Display>,
    body: Option<&str>,
) -> String {
    let status = status.map(|s| s.to_string()).unwrap_or_default();
    let mut message = format!("{operation}: Failed to {action} to {url} with status {status}");

    if let Some(err) = err {
        message.push_str(&format!(": {err}"));
    }
    if let Some(body) = body.filter(|b| !b.is_empty()) {
        message.push_str(&format!("; Response Body: {body}"));
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_full() {
        let msg = diagnostic(
            "CreateCloud",
            "make POST call",
            "https://host/accounts/a/topology/v1/clouds",
            Some(StatusCode::BAD_REQUEST),
            Some(&"Unexpected status"),
            Some(r#"{"detail":"bad"}"#),
        );
        assert_eq!(
            msg,
            r#"CreateCloud: Failed to make POST call to https://host/accounts/a/topology/v1/clouds with status 400 Bad Request: Unexpected status; Response Body: {"detail":"bad"}"#
        );
    }

    #[test]
    fn test_diagnostic_minimal() {
        let msg = diagnostic("GetCluster", "make GET call", "https://h/x", None, None, Some(""));
        assert_eq!(msg, "GetCluster: Failed to make GET call to https://h/x with status ");
    }

    #[test]
    fn test_terminal_classification() {
        assert!(RegistrationError::InvalidRequest("id set".into()).is_terminal());
        assert!(RegistrationError::IdentityConflict("x".into()).is_terminal());
        assert!(!RegistrationError::UnexpectedStatus {
            reason: "503".into(),
            status: StatusCode::SERVICE_UNAVAILABLE,
        }
        .is_terminal());
    }

    #[test]
    fn test_reason_matches_display() {
        let err = RegistrationError::NotFound {
            reason: "cloud 'abc' does not exist".into(),
        };
        assert_eq!(err.reason(), "cloud 'abc' does not exist");
        assert_eq!(err.to_string(), err.reason());
    }
}
