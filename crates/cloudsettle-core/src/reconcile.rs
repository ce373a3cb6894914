//! Incremental reconciliation of collection-valued attributes
//!
//! Remote collections (tags, IP allowlists, database users) rarely support
//! in-place updates, so a change is expressed as "remove the old element, add
//! the new one", each as its own mutation followed by its own convergence run.

use crate::classify::{Classification, OperationKind, classify};
use crate::converge::ConvergenceSpec;
use crate::error::{ApiError, ConvergenceError, ProbeError, SpecError};
use crate::poll::PollFunction;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::time::Instant;
use thiserror::Error;

/// Elements to add and remove to turn `previous` into `desired`
///
/// Elements compare by full value: an entry whose description changed is a
/// different element from the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDelta<T> {
    pub to_add: Vec<T>,
    pub to_remove: Vec<T>,
}

impl<T: Eq + Hash + Clone> SetDelta<T> {
    /// `to_add = desired \ previous`, `to_remove = previous \ desired`
    ///
    /// Input order is preserved and duplicates are dropped.
    pub fn between<P, D>(previous: P, desired: D) -> Self
    where
        P: IntoIterator<Item = T>,
        D: IntoIterator<Item = T>,
    {
        let previous = dedup(previous);
        let desired = dedup(desired);
        let previous_set: HashSet<&T> = previous.iter().collect();
        let desired_set: HashSet<&T> = desired.iter().collect();

        let to_add = desired
            .iter()
            .filter(|e| !previous_set.contains(e))
            .cloned()
            .collect();
        let to_remove = previous
            .iter()
            .filter(|e| !desired_set.contains(e))
            .cloned()
            .collect();

        Self { to_add, to_remove }
    }
}

impl<T> SetDelta<T> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

fn dedup<T: Eq + Hash + Clone>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Direction of one element change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Change {
    Add,
    Remove,
}

impl Change {
    /// Operation kind used to classify errors of this change
    pub fn operation(&self) -> OperationKind {
        match self {
            Change::Add => OperationKind::Create,
            Change::Remove => OperationKind::Delete,
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Add => write!(f, "add"),
            Change::Remove => write!(f, "remove"),
        }
    }
}

/// Failure of a single element change
#[derive(Error, Debug)]
pub enum ElementError {
    #[error("mutation failed: {0}")]
    Mutation(#[from] ProbeError),

    #[error("invalid wait configuration: {0}")]
    Spec(#[from] SpecError),

    #[error("{0}")]
    Wait(ConvergenceError),
}

impl From<ApiError> for ElementError {
    fn from(err: ApiError) -> Self {
        ElementError::Mutation(ProbeError::Api(err))
    }
}

/// Mutations for the elements of one remote collection
///
/// Each method issues the remote call and returns the spec that waits for it
/// to take effect.
#[async_trait]
pub trait ElementOps<T: Send + Sync>: Send + Sync {
    type Poll: PollFunction;

    async fn add(&self, element: &T) -> Result<ConvergenceSpec<Self::Poll>, ElementError>;

    async fn remove(&self, element: &T) -> Result<ConvergenceSpec<Self::Poll>, ElementError>;
}

/// A successfully applied element change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementOutcome {
    pub element: String,
    pub change: Change,
}

/// A failed element change
#[derive(Error, Debug)]
#[error("failed to {change} {element}: {error}")]
pub struct ElementFailure {
    pub element: String,
    pub change: Change,
    #[source]
    pub error: ElementError,
}

/// Result of applying a [`SetDelta`]
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub applied: Vec<ElementOutcome>,
    pub failed: Vec<ElementFailure>,
    pub duration_ms: u64,
}

impl ReconcileReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.applied.len() + self.failed.len()
    }

    pub fn into_result(self) -> Result<ReconcileReport, ReconcileError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(ReconcileError {
            attempted: self.attempted(),
            failures: self.failed,
        })
    }
}

/// Every element change that failed during one reconciliation
#[derive(Debug)]
pub struct ReconcileError {
    pub failures: Vec<ElementFailure>,
    pub attempted: usize,
}

impl ReconcileError {
    pub fn first(&self) -> Option<&ElementFailure> {
        self.failures.first()
    }

    pub fn failed_elements(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.element.as_str()).collect()
    }
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} change(s) failed",
            self.failures.len(),
            self.attempted
        )?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| f as &(dyn std::error::Error + 'static))
    }
}

/// Which half of the delta is applied first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    AddsFirst,
    RemovesFirst,
}

/// Applies a [`SetDelta`] through an [`ElementOps`] implementation
///
/// Failures never stop the run: every element is attempted and every failure
/// is reported, since the mutations that did go through already changed the
/// remote side. Nothing is rolled back.
pub struct Reconciler<'a, O> {
    ops: &'a O,
    concurrency: usize,
    order: Order,
}

impl<'a, O> Reconciler<'a, O> {
    pub fn new(ops: &'a O) -> Self {
        Self {
            ops,
            concurrency: 1,
            order: Order::default(),
        }
    }

    /// Number of elements processed at once within each half (default 1)
    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Diff `previous` against `desired` and apply the delta
    pub async fn reconcile<T, P, D>(
        &self,
        previous: P,
        desired: D,
    ) -> Result<ReconcileReport, ReconcileError>
    where
        O: ElementOps<T>,
        T: Eq + Hash + Clone + fmt::Display + Send + Sync,
        P: IntoIterator<Item = T>,
        D: IntoIterator<Item = T>,
    {
        let delta = SetDelta::between(previous, desired);
        self.apply(&delta).await.into_result()
    }

    /// Apply an already computed delta
    pub async fn apply<T>(&self, delta: &SetDelta<T>) -> ReconcileReport
    where
        O: ElementOps<T>,
        T: fmt::Display + Send + Sync,
    {
        let start = Instant::now();
        let mut report = ReconcileReport::default();

        if delta.is_empty() {
            return report;
        }

        tracing::debug!(
            add = delta.to_add.len(),
            remove = delta.to_remove.len(),
            "Reconciling collection"
        );

        let phases = match self.order {
            Order::AddsFirst => [
                (Change::Add, &delta.to_add),
                (Change::Remove, &delta.to_remove),
            ],
            Order::RemovesFirst => [
                (Change::Remove, &delta.to_remove),
                (Change::Add, &delta.to_add),
            ],
        };

        for (change, elements) in phases {
            let results: Vec<(String, Result<(), ElementError>)> = stream::iter(elements)
                .map(|element| async move {
                    (element.to_string(), self.apply_one(change, element).await)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

            for (element, result) in results {
                match result {
                    Ok(()) => {
                        tracing::info!(element = %element, change = %change, "Applied");
                        report.applied.push(ElementOutcome { element, change });
                    }
                    Err(error) => {
                        tracing::warn!(element = %element, change = %change, "Failed: {}", error);
                        report.failed.push(ElementFailure {
                            element,
                            change,
                            error,
                        });
                    }
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    async fn apply_one<T>(&self, change: Change, element: &T) -> Result<(), ElementError>
    where
        O: ElementOps<T>,
        T: Send + Sync,
    {
        let issued = match change {
            Change::Add => self.ops.add(element).await,
            Change::Remove => self.ops.remove(element).await,
        };

        let spec = match issued {
            Ok(spec) => spec,
            Err(ElementError::Mutation(err)) => {
                return match classify(&err, change.operation()) {
                    Classification::SuccessAsDeleted => Ok(()),
                    _ => Err(ElementError::Mutation(err)),
                };
            }
            Err(err) => return Err(err),
        };

        spec.converge()
            .await
            .map(|_| ())
            .map_err(|err| ElementError::Wait(err.discard_object()))
    }
}

/// Sequentially reconcile `previous` into `desired`, adds first
pub async fn reconcile<T, O>(
    previous: &[T],
    desired: &[T],
    ops: &O,
) -> Result<ReconcileReport, ReconcileError>
where
    O: ElementOps<T>,
    T: Eq + Hash + Clone + fmt::Display + Send + Sync,
{
    Reconciler::new(ops)
        .reconcile(previous.iter().cloned(), desired.iter().cloned())
        .await
}
