//! cloudsettle core
//!
//! Turns asynchronous, eventually-consistent cloud control-plane operations
//! into awaited calls that resolve only once the remote side has settled.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │        resource lifecycle (create/update/delete)│
//! └───────┬─────────────────────────┬───────────────┘
//!         │ mutate + poll fn        │ previous/desired collection
//! ┌───────▼───────────────┐ ┌───────▼───────────────┐
//! │   Convergence engine  │◀│    Set reconciler     │
//! │  pending/target/timer │ │  one run per element  │
//! └───────┬───────────────┘ └───────────────────────┘
//!         │ probe errors
//! ┌───────▼───────────────┐ ┌───────────────────────┐
//! │   Error classifier    │ │ Composite ID codec    │
//! └───────────────────────┘ └───────────────────────┘
//! ```

pub mod classify;
pub mod converge;
pub mod error;
pub mod id;
pub mod lock;
pub mod poll;
pub mod reconcile;

// Re-exports
pub use classify::{Classification, OperationKind, classify};
pub use converge::{
    ConvergenceSpec, ConvergenceSpecBuilder, Timing, UnexpectedStatePolicy, converge,
};
pub use error::{ApiError, ConvergenceError, IdError, ProbeError, SpecError};
pub use id::{CompositeId, IdCodec};
pub use lock::{LockRegistry, NamedLock};
pub use poll::{FnPoll, PollFunction, PollResult, poll_fn};
pub use reconcile::{
    Change, ElementError, ElementFailure, ElementOps, ElementOutcome, Order, ReconcileError,
    ReconcileReport, Reconciler, SetDelta, reconcile,
};
pub use tokio_util::sync::CancellationToken;
