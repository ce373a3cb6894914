//! Shared wait configuration for lifecycle operations

use crate::error::Result;
use cloudsettle_config::WaitSettings;
use cloudsettle_core::{
    CancellationToken, ConvergenceSpec, ConvergenceSpecBuilder, LockRegistry, OperationKind,
    PollFunction, Timing,
};
use std::sync::Arc;

/// Timing profiles, named locks and an optional cancellation token shared by
/// every lifecycle handle
#[derive(Debug, Clone, Default)]
pub struct WaitContext {
    settings: Arc<WaitSettings>,
    locks: LockRegistry,
    cancel: Option<CancellationToken>,
}

impl WaitContext {
    pub fn new(settings: WaitSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            ..Self::default()
        }
    }

    /// Load timing profiles from the discovered settings file
    pub fn from_config() -> Result<Self> {
        Ok(Self::new(cloudsettle_config::load_settings()?))
    }

    /// Share a lock registry with other contexts
    pub fn with_locks(mut self, locks: LockRegistry) -> Self {
        self.locks = locks;
        self
    }

    /// Stop every wait started through this context when `token` is cancelled
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn settings(&self) -> &WaitSettings {
        &self.settings
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Timing for the call site `profile`, starting from `fallback`
    pub fn timing(&self, profile: &str, fallback: Timing) -> Timing {
        self.settings.timing_or(profile, fallback)
    }

    /// Spec builder with the profile's timing and the context's cancellation
    /// token applied
    pub(crate) fn spec<P: PollFunction>(
        &self,
        operation: OperationKind,
        poll: P,
        profile: &str,
        fallback: Timing,
    ) -> ConvergenceSpecBuilder<P> {
        let builder =
            ConvergenceSpec::builder(operation, poll).timing(self.timing(profile, fallback));
        match &self.cancel {
            Some(token) => builder.cancel_on(token.clone()),
            None => builder,
        }
    }
}
