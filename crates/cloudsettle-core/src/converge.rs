//! Convergence engine
//!
//! Drives a [`PollFunction`] until the remote resource reaches one of the
//! target states, turning an asynchronous control-plane operation into a
//! single awaited call.
//!
//! ```text
//!  initial_delay     min_poll_interval   min_poll_interval
//! ├──────────────┼───────────────────┤·····├───────────────────┤
//!                                    poll                      poll
//!                                     │                         │
//!                   pending ──────────┘      target × stability ┘──▶ Ok
//! ```

use crate::classify::{Classification, OperationKind, classify};
use crate::error::{ConvergenceError, SpecError};
use crate::poll::{PollFunction, PollResult};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const DEFAULT_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Timing parameters of one convergence run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Upper bound on the whole run, measured from the call
    pub timeout: Duration,

    /// Wait before the first probe
    pub initial_delay: Duration,

    /// Wait before every probe
    pub min_poll_interval: Duration,

    /// Consecutive target observations required for success
    pub stability: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            initial_delay: DEFAULT_DELAY,
            min_poll_interval: DEFAULT_POLL_INTERVAL,
            stability: 1,
        }
    }
}

impl Timing {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    pub fn with_stability(mut self, stability: u32) -> Self {
        self.stability = stability;
        self
    }
}

/// What to do with a state that is neither pending nor target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnexpectedStatePolicy {
    /// Stop with [`ConvergenceError::UnexpectedState`]
    #[default]
    Fail,
    /// Log it and keep polling until the timeout
    KeepPolling,
}

/// Immutable configuration for one convergence run
pub struct ConvergenceSpec<P> {
    operation: OperationKind,
    pending: HashSet<String>,
    target: HashSet<String>,
    poll: P,
    timing: Timing,
    unexpected: UnexpectedStatePolicy,
    cancel: Option<CancellationToken>,
    subject: String,
}

impl<P: PollFunction> ConvergenceSpec<P> {
    pub fn builder(operation: OperationKind, poll: P) -> ConvergenceSpecBuilder<P> {
        ConvergenceSpecBuilder {
            operation,
            pending: HashSet::new(),
            target: HashSet::new(),
            poll,
            timing: Timing::default(),
            unexpected: UnexpectedStatePolicy::default(),
            cancel: None,
            subject: String::from("resource"),
        }
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Run the engine on this spec
    pub async fn converge(self) -> Result<Option<P::Object>, ConvergenceError<P::Object>> {
        converge(self).await
    }
}

/// Builder for [`ConvergenceSpec`]
pub struct ConvergenceSpecBuilder<P> {
    operation: OperationKind,
    pending: HashSet<String>,
    target: HashSet<String>,
    poll: P,
    timing: Timing,
    unexpected: UnexpectedStatePolicy,
    cancel: Option<CancellationToken>,
    subject: String,
}

impl<P: PollFunction> ConvergenceSpecBuilder<P> {
    pub fn pending<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending.extend(states.into_iter().map(Into::into));
        self
    }

    pub fn target<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target.extend(states.into_iter().map(Into::into));
        self
    }

    pub fn timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timing.timeout = timeout;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.timing.initial_delay = delay;
        self
    }

    pub fn min_poll_interval(mut self, interval: Duration) -> Self {
        self.timing.min_poll_interval = interval;
        self
    }

    pub fn stability(mut self, stability: u32) -> Self {
        self.timing.stability = stability;
        self
    }

    pub fn on_unexpected(mut self, policy: UnexpectedStatePolicy) -> Self {
        self.unexpected = policy;
        self
    }

    /// Stop the run early when `token` is cancelled
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Name used in log lines, e.g. "subnet 0717-6a1b"
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn build(self) -> Result<ConvergenceSpec<P>, SpecError> {
        if self.target.is_empty() {
            return Err(SpecError::EmptyTarget);
        }
        if let Some(state) = self.pending.intersection(&self.target).next() {
            return Err(SpecError::OverlappingState(state.clone()));
        }
        if self.timing.stability == 0 {
            return Err(SpecError::ZeroStability);
        }

        Ok(ConvergenceSpec {
            operation: self.operation,
            pending: self.pending,
            target: self.target,
            poll: self.poll,
            timing: self.timing,
            unexpected: self.unexpected,
            cancel: self.cancel,
            subject: self.subject,
        })
    }
}

/// Drive `spec.poll` until a target state has been observed `stability` times
/// in a row
///
/// Returns the object from the final probe. `Ok(None)` means the probe had no
/// snapshot to offer, which is the normal outcome of a delete whose resource
/// is already gone.
pub async fn converge<P: PollFunction>(
    spec: ConvergenceSpec<P>,
) -> Result<Option<P::Object>, ConvergenceError<P::Object>> {
    let ConvergenceSpec {
        operation,
        pending,
        target,
        poll,
        timing,
        unexpected,
        cancel,
        subject,
    } = spec;

    let started = Instant::now();
    let deadline = started + timing.timeout;
    let mut last_state: Option<String> = None;
    let mut last_object: Option<P::Object> = None;
    let mut hits: u32 = 0;
    let mut polls: u32 = 0;

    tracing::debug!(
        subject = %subject,
        operation = %operation,
        timeout = ?timing.timeout,
        "Waiting for {:?}",
        sorted(&target)
    );

    if !pause_until(started + timing.initial_delay, deadline, cancel.as_ref()).await {
        return Err(ConvergenceError::Cancelled { last_state });
    }

    loop {
        let wake = Instant::now() + timing.min_poll_interval;
        if !pause_until(wake, deadline, cancel.as_ref()).await {
            return Err(ConvergenceError::Cancelled { last_state });
        }

        let probe = async {
            match cancel.as_ref() {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    result = poll.poll() => Some(result),
                },
                None => Some(poll.poll().await),
            }
        };
        // A poll that outlives the deadline is abandoned
        let result = match timeout_at(deadline, probe).await {
            Ok(Some(result)) => result,
            Ok(None) => return Err(ConvergenceError::Cancelled { last_state }),
            Err(_) => {
                let elapsed = started.elapsed();
                tracing::warn!(
                    subject = %subject,
                    polls,
                    elapsed = ?elapsed,
                    "Poll still running at the deadline"
                );
                return Err(ConvergenceError::Timeout {
                    last_object,
                    last_state,
                    target: sorted(&target),
                    elapsed,
                });
            }
        };
        polls += 1;

        let PollResult { object, state, err } = result;

        if let Some(err) = err {
            match classify(&err, operation) {
                Classification::Fatal => {
                    tracing::debug!(subject = %subject, polls, "Fatal probe error: {}", err);
                    return Err(ConvergenceError::Fatal(err));
                }
                Classification::SuccessAsDeleted => {
                    tracing::info!(
                        subject = %subject,
                        polls,
                        elapsed = ?started.elapsed(),
                        "Resource is gone"
                    );
                    return Ok(object);
                }
                Classification::Transient => {
                    tracing::warn!(subject = %subject, polls, "Transient probe error: {}", err);
                    if object.is_some() {
                        last_object = object;
                    }
                }
            }
        } else if target.contains(&state) {
            hits += 1;
            tracing::debug!(subject = %subject, polls, state = %state, hits, "Target state observed");
            if hits >= timing.stability {
                tracing::info!(
                    subject = %subject,
                    polls,
                    elapsed = ?started.elapsed(),
                    state = %state,
                    "Converged"
                );
                return Ok(object);
            }
            last_state = Some(state);
            last_object = object;
        } else {
            if hits > 0 {
                tracing::debug!(subject = %subject, state = %state, "Target state interrupted");
            }
            hits = 0;

            if !pending.contains(&state) {
                match unexpected {
                    UnexpectedStatePolicy::Fail => {
                        let mut expected = sorted(&pending);
                        expected.extend(sorted(&target));
                        return Err(ConvergenceError::UnexpectedState {
                            state,
                            expected,
                            object,
                        });
                    }
                    UnexpectedStatePolicy::KeepPolling => {
                        tracing::warn!(subject = %subject, state = %state, "Unexpected state, still waiting");
                    }
                }
            } else {
                tracing::debug!(subject = %subject, polls, state = %state, "Still pending");
            }
            last_state = Some(state);
            last_object = object;
        }

        if Instant::now() >= deadline {
            let elapsed = started.elapsed();
            tracing::warn!(
                subject = %subject,
                polls,
                elapsed = ?elapsed,
                last_state = last_state.as_deref().unwrap_or("unknown"),
                "Gave up waiting"
            );
            return Err(ConvergenceError::Timeout {
                last_object,
                last_state,
                target: sorted(&target),
                elapsed,
            });
        }
    }
}

/// Sleep until `wake` (never past `deadline`); false when cancelled
async fn pause_until(wake: Instant, deadline: Instant, cancel: Option<&CancellationToken>) -> bool {
    let until = wake.min(deadline);
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = sleep_until(until) => true,
        },
        None => {
            sleep_until(until).await;
            true
        }
    }
}

fn sorted(states: &HashSet<String>) -> Vec<String> {
    let mut states: Vec<String> = states.iter().cloned().collect();
    states.sort();
    states
}
