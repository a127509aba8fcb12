//! Generic asynchronous state polling.
//!
//! Every wait in the resize workflow — snapshot completion, volume
//! availability, detachment, attachment, instance power states — is the same
//! loop: query a remote resource, compare its coarse state against a desired
//! terminal value, and sleep between attempts until a deadline passes. The
//! [`Poller`] owns that loop once; call sites differ only in the query
//! closure and the terminal value.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::sleep;
use tracing::trace;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors raised while waiting for a remote state transition.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PollError<E> {
    /// Raised when the desired state was not reached within the budget.
    #[error("timeout waiting for {action} on {target}")]
    Timeout {
        /// Transition being waited on.
        action: String,
        /// Identifier of the resource being observed.
        target: String,
    },
    /// Raised when the query itself failed; aborts the wait immediately.
    #[error(transparent)]
    Query(E),
}

/// Repeatedly queries remote state until a desired terminal value.
///
/// The poller has no side effects of its own: it only invokes the
/// caller-supplied query and sleeps between attempts. Suspension inside
/// [`Poller::wait_for`] is the workflow's only blocking point.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Poller {
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl Poller {
    /// Creates a poller with an explicit interval and timeout budget.
    #[must_use]
    pub const fn new(poll_interval: Duration, wait_timeout: Duration) -> Self {
        Self {
            poll_interval,
            wait_timeout,
        }
    }

    /// Overrides the sleep interval between attempts.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the total wait budget.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Sleep interval between attempts.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Total wait budget.
    #[must_use]
    pub const fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Queries until `desired` is observed, the query errors, or the budget
    /// is exhausted.
    ///
    /// The query returns `Ok(None)` when the resource is not yet visible;
    /// the wait continues, since eventual consistency can briefly hide a
    /// freshly created resource.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Query`] with the first query failure, or
    /// [`PollError::Timeout`] when the deadline passes without observing
    /// `desired`.
    pub async fn wait_for<S, E, Q, Fut>(
        &self,
        action: &str,
        target: &str,
        desired: &S,
        mut query: Q,
    ) -> Result<(), PollError<E>>
    where
        S: PartialEq + fmt::Debug,
        Q: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<S>, E>>,
    {
        let deadline = Instant::now() + self.wait_timeout;
        while Instant::now() <= deadline {
            match query().await.map_err(PollError::Query)? {
                Some(state) if state == *desired => return Ok(()),
                Some(state) => {
                    trace!(action, target, observed = ?state, "state not yet terminal");
                }
                None => trace!(action, target, "resource not visible yet"),
            }
            sleep(self.poll_interval).await;
        }

        Err(PollError::Timeout {
            action: action.to_owned(),
            target: target.to_owned(),
        })
    }
}
