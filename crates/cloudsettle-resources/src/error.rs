//! Resource lifecycle error types

use cloudsettle_config::ConfigError;
use cloudsettle_core::{ApiError, ConvergenceError, IdError, ReconcileError, SpecError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("{resource}: {source}")]
    Api {
        resource: String,
        #[source]
        source: ApiError,
    },

    #[error("{resource}: {source}")]
    Wait {
        resource: String,
        #[source]
        source: ConvergenceError,
    },

    #[error("{resource}: {source}")]
    Reconcile {
        resource: String,
        #[source]
        source: ReconcileError,
    },

    #[error("Invalid identifier: {0}")]
    Id(#[from] IdError),

    #[error("Invalid wait configuration: {0}")]
    Spec(#[from] SpecError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{resource}: converged without returning the resource")]
    MissingSnapshot { resource: String },
}

impl ResourceError {
    pub fn api(resource: impl Into<String>, source: ApiError) -> Self {
        Self::Api {
            resource: resource.into(),
            source,
        }
    }

    pub fn wait<T>(resource: impl Into<String>, source: ConvergenceError<T>) -> Self {
        Self::Wait {
            resource: resource.into(),
            source: source.discard_object(),
        }
    }

    pub fn reconcile(resource: impl Into<String>, source: ReconcileError) -> Self {
        Self::Reconcile {
            resource: resource.into(),
            source,
        }
    }

    pub fn missing_snapshot(resource: impl Into<String>) -> Self {
        Self::MissingSnapshot {
            resource: resource.into(),
        }
    }

    /// The wait for the remote side ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResourceError::Wait { source, .. } if source.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, ResourceError>;

/// Result of a delete-style call, with "already gone" folded into `Ok(None)`
pub(crate) fn tolerate_missing<T>(
    result: std::result::Result<T, ApiError>,
) -> std::result::Result<Option<T>, ApiError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() || err.is_gone() => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_snapshot_is_its_own_variant() {
        let err = ResourceError::missing_snapshot("instance i-1");
        assert!(matches!(
            &err,
            ResourceError::MissingSnapshot { resource } if resource == "instance i-1"
        ));
        assert!(!matches!(err, ResourceError::InvalidRequest(_)));
        assert!(!err.is_timeout());
        assert_eq!(
            err.to_string(),
            "instance i-1: converged without returning the resource"
        );
    }

    #[test]
    fn test_tolerate_missing() {
        assert_eq!(tolerate_missing(Ok(1)).unwrap(), Some(1));
        assert_eq!(tolerate_missing::<()>(Err(ApiError::new(404, "x"))).unwrap(), None);
        assert_eq!(tolerate_missing::<()>(Err(ApiError::new(410, "x"))).unwrap(), None);
        assert!(tolerate_missing::<()>(Err(ApiError::new(500, "x"))).is_err());
    }
}
