//! Error types for convergence, probing and identifiers

use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error reported by a remote control plane or the SDK wrapping it
///
/// Carries the HTTP-status-equivalent code (when the failure reached the
/// server at all), an optional machine-readable error code and the
/// human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code: None,
            message: message.into(),
        }
    }

    /// An error that never produced an HTTP response (connection reset, DNS, ...)
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message).with_code("not_found")
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Build an error from a status code and a raw response body
    ///
    /// Understands `{"errors":[{"code":..,"message":..}]}` payloads as well as
    /// flat `{"code":..,"message":..}` / `{"error":..}` objects. Anything else
    /// is kept verbatim as the message.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => {
                let (code, message) = parsed.into_parts();
                Self {
                    status: Some(status),
                    code,
                    message: message.unwrap_or_else(|| body.trim().to_string()),
                }
            }
            Err(_) => Self::new(status, body.trim()),
        }
    }

    /// Remote "object not found" (404, `not_found` code or message)
    pub fn is_not_found(&self) -> bool {
        if self.status == Some(404) {
            return true;
        }
        if self.code.as_deref() == Some("not_found") {
            return true;
        }
        let message = self.message.to_ascii_lowercase();
        message.contains("not found") || message.contains("not_found")
    }

    /// Remote "gone" (410); some backends use it for deletes of removed objects
    pub fn is_gone(&self) -> bool {
        self.status == Some(410)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.code) {
            (Some(status), Some(code)) => write!(f, "API error {} ({}): {}", status, code, self.message),
            (Some(status), None) => write!(f, "API error {}: {}", status, self.message),
            (None, _) => write!(f, "request failed: {}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorItem>,
    code: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ErrorItem {
    code: Option<String>,
    message: Option<String>,
}

impl ErrorBody {
    fn into_parts(self) -> (Option<String>, Option<String>) {
        if let Some(first) = self.errors.into_iter().next() {
            return (first.code, first.message);
        }
        (self.code, self.message.or(self.error))
    }
}

/// Failure of a single probe
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The remote object's own status reports a permanent failure
    #[error("remote resource entered failure state '{state}': {message}")]
    Failed { state: String, message: String },
}

impl ProbeError {
    pub fn failed(state: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            state: state.into(),
            message: message.into(),
        }
    }

    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            ProbeError::Api(err) => Some(err),
            ProbeError::Failed { .. } => None,
        }
    }
}

/// Non-success outcome of a convergence run
///
/// `T` is the polled object type; timeouts and unexpected states hand the
/// last observed snapshot back to the caller.
#[derive(Debug)]
pub enum ConvergenceError<T = ()> {
    Fatal(ProbeError),

    UnexpectedState {
        state: String,
        expected: Vec<String>,
        object: Option<T>,
    },

    Timeout {
        last_object: Option<T>,
        last_state: Option<String>,
        target: Vec<String>,
        elapsed: Duration,
    },

    Cancelled { last_state: Option<String> },
}

impl<T> fmt::Display for ConvergenceError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceError::Fatal(cause) => write!(f, "{}", cause),
            ConvergenceError::UnexpectedState {
                state, expected, ..
            } => write!(f, "unexpected state '{}', expected one of {:?}", state, expected),
            ConvergenceError::Timeout {
                last_state,
                target,
                elapsed,
                ..
            } => write!(
                f,
                "timeout after {:?} waiting for state {:?} (last state: {})",
                elapsed,
                target,
                last_state.as_deref().unwrap_or("unknown")
            ),
            ConvergenceError::Cancelled { last_state } => write!(
                f,
                "convergence cancelled (last state: {})",
                last_state.as_deref().unwrap_or("unknown")
            ),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for ConvergenceError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConvergenceError::Fatal(cause) => Some(cause),
            _ => None,
        }
    }
}

impl<T> ConvergenceError<T> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConvergenceError::Timeout { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ConvergenceError::Fatal(_))
    }

    pub fn last_state(&self) -> Option<&str> {
        match self {
            ConvergenceError::Fatal(ProbeError::Failed { state, .. }) => Some(state),
            ConvergenceError::Fatal(ProbeError::Api(_)) => None,
            ConvergenceError::UnexpectedState { state, .. } => Some(state),
            ConvergenceError::Timeout { last_state, .. }
            | ConvergenceError::Cancelled { last_state } => last_state.as_deref(),
        }
    }

    pub fn last_object(&self) -> Option<&T> {
        match self {
            ConvergenceError::UnexpectedState { object, .. } => object.as_ref(),
            ConvergenceError::Timeout { last_object, .. } => last_object.as_ref(),
            _ => None,
        }
    }

    /// Drop the snapshot, keeping the state and cause
    pub fn discard_object(self) -> ConvergenceError {
        match self {
            ConvergenceError::Fatal(cause) => ConvergenceError::Fatal(cause),
            ConvergenceError::UnexpectedState {
                state, expected, ..
            } => ConvergenceError::UnexpectedState {
                state,
                expected,
                object: None,
            },
            ConvergenceError::Timeout {
                last_state,
                target,
                elapsed,
                ..
            } => ConvergenceError::Timeout {
                last_object: None,
                last_state,
                target,
                elapsed,
            },
            ConvergenceError::Cancelled { last_state } => ConvergenceError::Cancelled { last_state },
        }
    }
}

/// Invalid convergence configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("no target states given")]
    EmptyTarget,

    #[error("state '{0}' is both pending and target")]
    OverlappingState(String),

    #[error("stability count must be at least 1")]
    ZeroStability,
}

/// Malformed composite identifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier '{id}' has {found} part(s), expected {expected} separated by '{separator}'")]
    WrongArity {
        id: String,
        separator: char,
        expected: usize,
        found: usize,
    },

    #[error("identifier '{id}' contains an empty part at position {position}")]
    EmptyPart { id: String, position: usize },

    #[error("identifier part '{part}' contains the separator '{separator}'")]
    SeparatorInPart { part: String, separator: char },

    #[error("cannot encode an identifier with no parts")]
    NoParts,
}
