//! Error classification by operation kind
//!
//! The same wire-level signal means opposite things depending on what the
//! caller is trying to achieve: "not found" is the goal of a delete and a
//! dead end for a create.

use crate::error::ProbeError;
use serde::{Deserialize, Serialize};

/// Kind of lifecycle operation a convergence run belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// How the convergence loop should react to a probe error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Abort now; the condition can never self-heal
    Fatal,
    /// Keep polling at the normal interval
    Transient,
    /// The resource is already gone, which is what a delete wants
    SuccessAsDeleted,
}

/// Classify a probe (or mutation) error for the given operation
pub fn classify(err: &ProbeError, kind: OperationKind) -> Classification {
    let api = match err {
        ProbeError::Failed { .. } => return Classification::Fatal,
        ProbeError::Api(api) => api,
    };

    if api.is_not_found() {
        return match kind {
            OperationKind::Delete => Classification::SuccessAsDeleted,
            OperationKind::Create | OperationKind::Update => Classification::Fatal,
        };
    }

    if api.is_gone() && kind == OperationKind::Delete {
        return Classification::SuccessAsDeleted;
    }

    Classification::Transient
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;

    #[test]
    fn test_not_found_depends_on_operation() {
        let err = ProbeError::from(ApiError::not_found("instance r006-1 not found"));
        assert_eq!(
            classify(&err, OperationKind::Delete),
            Classification::SuccessAsDeleted
        );
        assert_eq!(classify(&err, OperationKind::Create), Classification::Fatal);
        assert_eq!(classify(&err, OperationKind::Update), Classification::Fatal);
    }

    #[test]
    fn test_gone_on_delete() {
        let err = ProbeError::from(ApiError::new(410, "resource removed"));
        assert_eq!(
            classify(&err, OperationKind::Delete),
            Classification::SuccessAsDeleted
        );
        assert_eq!(
            classify(&err, OperationKind::Create),
            Classification::Transient
        );
    }

    #[test]
    fn test_failed_state_is_always_fatal() {
        let err = ProbeError::failed("failed", "provisioning error");
        for kind in [
            OperationKind::Create,
            OperationKind::Update,
            OperationKind::Delete,
        ] {
            assert_eq!(classify(&err, kind), Classification::Fatal);
        }
    }

    #[test]
    fn test_everything_else_is_transient() {
        let errors = [
            ApiError::new(503, "Service Unavailable"),
            ApiError::new(429, "Too Many Requests"),
            ApiError::transport("connection reset by peer"),
        ];
        for err in errors {
            assert_eq!(
                classify(&ProbeError::from(err), OperationKind::Create),
                Classification::Transient
            );
        }
    }
}
