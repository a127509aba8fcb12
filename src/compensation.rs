//! Ordered compensation stack for saga-style rollback.
//!
//! Each resource-mutating step of the resize workflow registers its own
//! undo in the same place it performs the mutation. On exit the stack is
//! unwound in strict reverse registration order, running the branch that
//! matches the workflow outcome: `on_failure` actions restore or delete
//! resources after an abort, `on_success` actions release resources the
//! committed workflow no longer needs. An action's own failure is logged
//! and never re-raised; remaining compensations always run.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tracing::{debug, warn};

/// Future returned by a compensation action.
pub type CompensationFuture = Pin<Box<dyn Future<Output = Result<(), CompensationError>> + Send>>;

/// Deferred no-argument compensation operation.
pub type CompensationAction = Box<dyn FnOnce() -> CompensationFuture + Send>;

/// Failure of a single compensation action.
///
/// These never abort the unwind; they exist so the stack can log what went
/// wrong with enough context for an operator to remediate by hand.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message}")]
pub struct CompensationError {
    /// Human-readable description of the failed remediation.
    pub message: String,
}

impl CompensationError {
    /// Wraps any displayable error.
    #[must_use]
    pub fn new(err: impl std::fmt::Display) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

/// A registered pair of outcome-conditional actions.
///
/// Either branch may be absent: a resource whose fate only matters on
/// failure registers no `on_success` action, and vice versa. An
/// unconditional cleanup registers the same operation on both branches.
pub struct Compensation {
    label: String,
    on_failure: Option<CompensationAction>,
    on_success: Option<CompensationAction>,
}

impl Compensation {
    /// Starts an empty compensation with a label used in logs.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            on_failure: None,
            on_success: None,
        }
    }

    /// Sets the action run when the workflow failed.
    #[must_use]
    pub fn on_failure(
        mut self,
        action: impl FnOnce() -> CompensationFuture + Send + 'static,
    ) -> Self {
        self.on_failure = Some(Box::new(action));
        self
    }

    /// Sets the action run when the workflow committed.
    #[must_use]
    pub fn on_success(
        mut self,
        action: impl FnOnce() -> CompensationFuture + Send + 'static,
    ) -> Self {
        self.on_success = Some(Box::new(action));
        self
    }
}

/// Outcome of an unwind pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UnwindReport {
    /// Number of actions that ran.
    pub attempted: usize,
    /// Number of actions that reported an error (logged, not raised).
    pub failed: usize,
}

/// Ordered list of compensations, unwound in reverse registration order.
#[derive(Default)]
pub struct CompensationStack {
    entries: Vec<Compensation>,
}

impl CompensationStack {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a compensation; it will run before everything already
    /// registered.
    pub fn register(&mut self, compensation: Compensation) {
        self.entries.push(compensation);
    }

    /// Number of registered compensations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs the branch matching `workflow_failed` for every entry, last
    /// registered first.
    ///
    /// Action errors are logged through `tracing` and counted in the
    /// report; they never stop the remaining compensations.
    pub async fn unwind(mut self, workflow_failed: bool) -> UnwindReport {
        let mut report = UnwindReport::default();
        for entry in self.entries.drain(..).rev() {
            let Compensation {
                label,
                on_failure,
                on_success,
            } = entry;
            let branch = if workflow_failed {
                on_failure
            } else {
                on_success
            };
            let Some(action) = branch else {
                continue;
            };

            report.attempted += 1;
            match action().await {
                Ok(()) => debug!(compensation = %label, workflow_failed, "compensation ran"),
                Err(err) => {
                    report.failed += 1;
                    warn!(compensation = %label, workflow_failed, error = %err,
                        "compensation action failed");
                }
            }
        }
        report
    }
}
