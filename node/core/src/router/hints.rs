//! Routing directives passed alongside a query

use std::future::Future;
use std::sync::Arc;

use super::{FuncRouter, Router};
use crate::context::RouteContext;
use crate::error::RouteError;
use crate::query::Query;
use crate::stream::Duplex;

/// Per-call routing directives
#[derive(Clone, Default)]
pub struct Hints {
    /// Suppress per-query log lines
    pub silent: bool,
    /// Re-dispatch a nonce that already has a registered connection
    pub reroute: bool,
    /// With `reroute`, replace the connection's stored query
    pub update: bool,
    /// Use this router instead of the route table
    pub via: Option<Arc<dyn Router>>,
}

impl Hints {
    /// Hints with logging suppressed
    #[must_use]
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    /// Hints for re-dispatching an in-flight nonce
    #[must_use]
    pub fn reroute(update: bool) -> Self {
        Self {
            reroute: true,
            update,
            ..Self::default()
        }
    }

    /// Route through `router` directly
    #[must_use]
    pub fn with_via(mut self, router: Arc<dyn Router>) -> Self {
        self.via = Some(router);
        self
    }

    /// Route through a closure directly
    #[must_use]
    pub fn via_fn<F, Fut>(self, func: F) -> Self
    where
        F: Fn(RouteContext, Query, Arc<dyn Duplex>, Hints) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Duplex>, RouteError>> + Send + 'static,
    {
        self.with_via(Arc::new(FuncRouter::new(func).with_name("via")))
    }
}

impl std::fmt::Debug for Hints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hints")
            .field("silent", &self.silent)
            .field("reroute", &self.reroute)
            .field("update", &self.update)
            .field("via", &self.via.as_ref().map(|r| r.name()))
            .finish()
    }
}
