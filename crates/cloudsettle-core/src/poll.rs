//! Probe abstraction driven by the convergence engine

use crate::error::{ApiError, ProbeError};
use async_trait::async_trait;
use std::future::Future;

/// Result of one probe of a remote resource
#[derive(Debug, Clone)]
pub struct PollResult<T> {
    /// Snapshot of the remote resource at probe time
    pub object: Option<T>,

    /// Caller-defined state label (e.g. "available", "deleting")
    pub state: String,

    /// Probe-level failure, distinct from a pending/target state
    pub err: Option<ProbeError>,
}

impl<T> PollResult<T> {
    pub fn state(object: T, state: impl Into<String>) -> Self {
        Self {
            object: Some(object),
            state: state.into(),
            err: None,
        }
    }

    /// A state observation without a snapshot (e.g. a synthetic "deleted")
    pub fn bare(state: impl Into<String>) -> Self {
        Self {
            object: None,
            state: state.into(),
            err: None,
        }
    }

    pub fn error(err: impl Into<ProbeError>) -> Self {
        Self {
            object: None,
            state: String::new(),
            err: Some(err.into()),
        }
    }

    /// The object reports a permanent failure through its own status field
    pub fn failed(object: T, state: impl Into<String>, message: impl Into<String>) -> Self {
        let state = state.into();
        Self {
            object: Some(object),
            err: Some(ProbeError::failed(state.clone(), message)),
            state,
        }
    }

    /// Convert a fetch result plus a status extractor into a probe result
    pub fn from_fetch(result: Result<T, ApiError>, status: impl FnOnce(&T) -> String) -> Self {
        match result {
            Ok(object) => {
                let state = status(&object);
                Self::state(object, state)
            }
            Err(err) => Self::error(err),
        }
    }
}

/// A side-effecting probe that fetches and classifies one remote resource
#[async_trait]
pub trait PollFunction: Send + Sync {
    type Object: Send;

    async fn poll(&self) -> PollResult<Self::Object>;
}

/// Probe built from an async closure, see [`poll_fn`]
pub struct FnPoll<F> {
    f: F,
}

/// Wrap an async closure as a [`PollFunction`]
///
/// ```ignore
/// let probe = poll_fn(|| async {
///     PollResult::from_fetch(api.get_subnet(&id).await, |s| s.status.clone())
/// });
/// ```
pub fn poll_fn<F>(f: F) -> FnPoll<F> {
    FnPoll { f }
}

#[async_trait]
impl<F, Fut, T> PollFunction for FnPoll<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = PollResult<T>> + Send,
    T: Send,
{
    type Object = T;

    async fn poll(&self) -> PollResult<T> {
        (self.f)().await
    }
}

#[async_trait]
impl<P: PollFunction + ?Sized> PollFunction for Box<P> {
    type Object = P::Object;

    async fn poll(&self) -> PollResult<P::Object> {
        (**self).poll().await
    }
}
