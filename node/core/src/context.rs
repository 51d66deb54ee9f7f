//! Routing Context
//!
//! A [`RouteContext`] carries cancellation and an optional deadline through a
//! routing call. Children inherit both: cancelling a parent cancels every
//! child, and a child's deadline is never later than its parent's.
//!
//! ```text
//!   node ctx (no deadline)
//!     └── query ctx (now + 60s)          with_timeout
//!           └── link race ctx            child, cancelled by the winner
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::RouteError;

/// Cancellable, deadline-bearing execution context for routing calls
#[derive(Clone, Debug, Default)]
pub struct RouteContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RouteContext {
    /// Root context with no deadline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Child that is cancelled with this context but can be cancelled alone
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Child whose deadline is the earlier of this context's and `now + timeout`
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the context was cancelled explicitly
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Absolute deadline, if any
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline (`None` without a deadline)
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Underlying cancellation token
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Completes when the context is cancelled or its deadline passes
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Run `fut` until it finishes or the context ends
    ///
    /// Returns [`RouteError::Timeout`] if the context ends first. The inner
    /// future is dropped at that point.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T, RouteError>
    where
        F: Future<Output = Result<T, RouteError>>,
    {
        tokio::select! {
            biased;
            () = self.done() => Err(RouteError::Timeout),
            res = fut => res,
        }
    }
}
