//! Query Routing
//!
//! Everything that can take a query and produce the target's stream
//! implements [`Router`]. Routers compose by nesting:
//!
//! ```text
//!   CoreRouter (nonce guard, timeout, connection tracking)
//!     │  route table, highest priority first
//!     ├── (anyone, self)  -> PrefixRouter   local services
//!     │                        ├── "echo"        -> FuncRouter
//!     │                        └── "storage.*"   -> PriorityRouter
//!     └── (self, peer)    -> LinkRouter     one per active link
//! ```
//!
//! Failures use the [`RouteError`] taxonomy so that composite routers can
//! tell terminal errors (stop) from soft ones (try the next candidate).
//!
//! The nonce guard in [`CoreRouter`] is the only defense against cycles in
//! this graph. It is checked per query, not per edge.

mod core_router;
mod hints;
mod prefix;
mod priority;
mod route;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::RouteContext;
use crate::error::RouteError;
use crate::query::Query;
use crate::stream::Duplex;

pub use core_router::{CoreRouter, DEFAULT_ROUTING_TIMEOUT};
pub use hints::Hints;
pub use prefix::PrefixRouter;
pub use priority::PriorityRouter;
pub use route::{match_routes, Route};

/// The single routing operation
#[async_trait]
pub trait Router: Send + Sync {
    /// Resolve `query` and return the stream toward its target
    ///
    /// `caller` is the stream back to the party that asked. Failures must be
    /// one of the [`RouteError`] kinds.
    async fn route_query(
        &self,
        ctx: &RouteContext,
        query: &Query,
        caller: Arc<dyn Duplex>,
        hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError>;

    /// Name used in routing traces
    fn name(&self) -> String {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Whether two handles point at the same router instance
#[must_use]
pub fn same_router(a: &Arc<dyn Router>, b: &Arc<dyn Router>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

// ============================================================================
// FuncRouter
// ============================================================================

/// Boxed routing closure
pub type RouteFn = dyn Fn(RouteContext, Query, Arc<dyn Duplex>, Hints) -> BoxFuture<'static, Result<Arc<dyn Duplex>, RouteError>>
    + Send
    + Sync;

/// Adapts a closure into a [`Router`]
#[derive(Clone)]
pub struct FuncRouter {
    name: String,
    func: Arc<RouteFn>,
}

impl FuncRouter {
    /// Wrap an async closure
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(RouteContext, Query, Arc<dyn Duplex>, Hints) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Duplex>, RouteError>> + Send + 'static,
    {
        Self {
            name: "FuncRouter".to_string(),
            func: Arc::new(
                move |ctx: RouteContext,
                      query: Query,
                      caller: Arc<dyn Duplex>,
                      hints: Hints|
                      -> BoxFuture<'static, Result<Arc<dyn Duplex>, RouteError>> {
                    Box::pin(func(ctx, query, caller, hints))
                },
            ),
        }
    }

    /// Override the name shown in routing traces
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Router for FuncRouter {
    async fn route_query(
        &self,
        ctx: &RouteContext,
        query: &Query,
        caller: Arc<dyn Duplex>,
        hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError> {
        (self.func)(ctx.clone(), query.clone(), caller, hints.clone()).await
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

impl std::fmt::Debug for FuncRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuncRouter").field("name", &self.name).finish()
    }
}
