//! Routing Error Taxonomy
//!
//! Every router returns one of the [`RouteError`] kinds so that composite
//! routers can tell a terminal failure (stop the chain) from a soft one (try
//! the next candidate).
//!
//! ```text
//!   Rejected / Aborted / Timeout  -> terminal, returned as-is
//!   anything else                 -> collected, surfaced as RouteNotFound
//!                                    once every candidate has been tried
//! ```

use std::fmt;

use thiserror::Error;

// ============================================================================
// Route Errors
// ============================================================================

/// Errors returned by [`Router::route_query`](crate::router::Router::route_query)
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    /// The query's nonce is already being routed by this engine
    #[error("routing cycle not allowed")]
    RoutingCycle,

    /// No candidate accepted the query
    #[error("{0}")]
    RouteNotFound(RouteNotFound),

    /// A candidate explicitly refused the query
    #[error("query rejected")]
    Rejected,

    /// A candidate started handling the query but gave up
    #[error("query aborted")]
    Aborted,

    /// The routing deadline passed or the context was cancelled
    #[error("routing timed out")]
    Timeout,

    /// A reroute referenced a connection that does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

impl RouteError {
    /// Build a `RouteNotFound` aggregate for `router` from candidate failures
    pub fn not_found(router: impl Into<String>, failures: Vec<RouteFailure>) -> Self {
        Self::RouteNotFound(RouteNotFound {
            router: router.into(),
            failures,
        })
    }

    /// Whether this error stops a priority chain
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Aborted | Self::Timeout)
    }

    /// The aggregate carried by a `RouteNotFound` error
    #[must_use]
    pub fn as_route_not_found(&self) -> Option<&RouteNotFound> {
        match self {
            Self::RouteNotFound(rnf) => Some(rnf),
            _ => None,
        }
    }
}

/// One candidate's failure inside a [`RouteNotFound`] aggregate
#[derive(Debug, Clone)]
pub struct RouteFailure {
    /// Name of the router that was tried
    pub router: String,
    /// Why it failed
    pub error: RouteError,
}

impl RouteFailure {
    /// Record a failed candidate
    pub fn new(router: impl Into<String>, error: RouteError) -> Self {
        Self {
            router: router.into(),
            error,
        }
    }
}

/// Aggregate of every candidate failure seen by one router
#[derive(Debug, Clone)]
pub struct RouteNotFound {
    /// Router that gave up
    pub router: String,
    /// Candidates in the order they were tried
    pub failures: Vec<RouteFailure>,
}

impl RouteNotFound {
    /// Multi-line description of which routers were tried and why each failed
    ///
    /// Nested aggregates are indented under the candidate that produced them.
    #[must_use]
    pub fn trace(&self) -> String {
        let mut out = String::new();
        self.write_trace(&mut out, 0);
        out
    }

    fn write_trace(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&format!("{indent}{}: route not found\n", self.router));
        for failure in &self.failures {
            match &failure.error {
                RouteError::RouteNotFound(nested) => nested.write_trace(out, depth + 1),
                other => out.push_str(&format!("{indent}  {}: {other}\n", failure.router)),
            }
        }
    }
}

impl fmt::Display for RouteNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route not found")?;
        if !self.failures.is_empty() {
            write!(f, " ({} candidates tried)", self.failures.len())?;
        }
        Ok(())
    }
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors from route-table and service-table mutation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Empty or malformed route name
    #[error("invalid route name")]
    InvalidName,

    /// An entry with the same key already exists
    #[error("already registered: {0}")]
    Duplicate(String),

    /// No entry matched exactly
    #[error("not found: {0}")]
    NotFound(String),
}
