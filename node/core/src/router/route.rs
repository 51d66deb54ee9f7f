//! Route table entries

use std::sync::Arc;

use super::{same_router, Router};
use crate::identity::Identity;

/// `(caller pattern, target pattern) -> router` at a priority
///
/// Patterns are either a concrete identity or [`Identity::anyone`]. Higher
/// priorities are tried first.
#[derive(Clone)]
pub struct Route {
    /// Caller pattern
    pub caller: Identity,
    /// Target pattern
    pub target: Identity,
    /// Router to delegate to
    pub router: Arc<dyn Router>,
    /// Priority, higher first
    pub priority: i32,
}

impl Route {
    /// Whether a query from `caller` to `target` matches this route
    #[must_use]
    pub fn matches(&self, caller: &Identity, target: &Identity) -> bool {
        caller.matches(&self.caller) && target.matches(&self.target)
    }

    /// Whether this entry is exactly `(caller, target, router)`
    #[must_use]
    pub fn is_entry(&self, caller: &Identity, target: &Identity, router: &Arc<dyn Router>) -> bool {
        same_router(&self.router, router) && self.caller.is_equal(caller) && self.target.is_equal(target)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("caller", &self.caller)
            .field("target", &self.target)
            .field("router", &self.router.name())
            .field("priority", &self.priority)
            .finish()
    }
}

/// Routes matching a caller/target pair, in the order given
///
/// Callers pass a priority-sorted table, so the result is sorted too.
#[must_use]
pub fn match_routes(routes: &[Route], caller: &Identity, target: &Identity) -> Vec<Route> {
    routes
        .iter()
        .filter(|route| route.matches(caller, target))
        .cloned()
        .collect()
}
