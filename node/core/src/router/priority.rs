//! Ordered fallback chain of routers

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use super::{same_router, Hints, Router};
use crate::context::RouteContext;
use crate::error::{RouteError, RouteFailure};
use crate::query::Query;
use crate::stream::Duplex;

type Entries = Arc<Vec<(Arc<dyn Router>, i32)>>;

/// Tries its routers from highest to lowest priority
///
/// The first success is returned, and so is the first terminal error
/// (`Rejected`, `Aborted`, `Timeout`). Other errors are collected into a
/// `RouteNotFound` once every entry has failed.
///
/// Entries are kept as a shared snapshot, so `add` and `remove` never wait
/// for queries that are being routed.
pub struct PriorityRouter {
    name: String,
    entries: RwLock<Entries>,
}

impl Default for PriorityRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityRouter {
    /// Empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::with_name("PriorityRouter")
    }

    /// Empty chain with a custom trace name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Add a router; re-adding the same router updates its priority
    pub fn add(&self, router: Arc<dyn Router>, priority: i32) {
        let mut entries = self.entries.write();
        let mut next: Vec<_> = entries
            .iter()
            .filter(|(r, _)| !same_router(r, &router))
            .cloned()
            .collect();
        next.push((router, priority));
        // stable: equal priorities keep insertion order
        next.sort_by(|a, b| b.1.cmp(&a.1));
        *entries = Arc::new(next);
    }

    /// Remove a router; returns whether it was present
    pub fn remove(&self, router: &Arc<dyn Router>) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        let next: Vec<_> = entries
            .iter()
            .filter(|(r, _)| !same_router(r, router))
            .cloned()
            .collect();
        let removed = next.len() != before;
        *entries = Arc::new(next);
        removed
    }

    /// Current entries, highest priority first
    #[must_use]
    pub fn entries(&self) -> Vec<(Arc<dyn Router>, i32)> {
        self.snapshot().as_ref().clone()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn snapshot(&self) -> Entries {
        self.entries.read().clone()
    }
}

#[async_trait]
impl Router for PriorityRouter {
    async fn route_query(
        &self,
        ctx: &RouteContext,
        query: &Query,
        caller: Arc<dyn Duplex>,
        hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError> {
        let entries = self.snapshot();
        let mut failures = Vec::new();

        for (router, priority) in entries.iter() {
            match router.route_query(ctx, query, caller.clone(), hints).await {
                Ok(target) => return Ok(target),
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => {
                    trace!(nonce = %query.nonce(), router = %router.name(), priority, error = %e, "candidate failed");
                    failures.push(RouteFailure::new(router.name(), e));
                }
            }
        }

        Err(RouteError::not_found(self.name.clone(), failures))
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
