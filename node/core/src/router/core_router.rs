//! Dispatch Engine
//!
//! [`CoreRouter`] is the entry point for every query the node handles:
//!
//! ```text
//!   route_query(q)
//!     │
//!     ├─ lock q.nonce ─── taken, not a reroute ──▶ RoutingCycle
//!     │
//!     ├─ reroute? ── find conn by nonce ──▶ route table (no new deadline)
//!     │
//!     └─ new query:
//!          ctx + 60s deadline
//!          register MonitoredConn (caller monitored)
//!          route table ─── error ──▶ deregister, return error
//!          attach target monitor, emit ConnAdded
//!          watcher: conn done ──▶ emit ConnRemoved
//! ```
//!
//! The route table is tried strictly in descending priority, one candidate
//! at a time. `Rejected`, `Aborted` and `Timeout` stop the walk; everything
//! else is collected and reported as `RouteNotFound` at the end.
//!
//! # Lock Order
//!
//! nonce set → connection registry → route table. None of them is held while
//! a downstream router runs.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::{match_routes, Hints, Route, Router};
use crate::conn::{ConnSet, MonitoredConn};
use crate::context::RouteContext;
use crate::error::{RegistryError, RouteError, RouteFailure};
use crate::events::{EventQueue, NodeEvent};
use crate::identity::Identity;
use crate::query::{Nonce, Query};
use crate::stream::Duplex;

/// Ceiling on the time a single query may spend routing
pub const DEFAULT_ROUTING_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Guards
// ============================================================================

/// Releases a nonce taken by this call when dropped
struct NonceGuard<'a> {
    enroute: &'a Mutex<HashSet<Nonce>>,
    nonce: Nonce,
}

impl Drop for NonceGuard<'_> {
    fn drop(&mut self) {
        self.enroute.lock().remove(&self.nonce);
    }
}

/// Deregisters a connection whose routing did not complete, including when
/// the routing future is dropped
struct PendingConn {
    conn: Arc<MonitoredConn>,
    armed: bool,
}

impl PendingConn {
    fn complete(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingConn {
    fn drop(&mut self) {
        if self.armed {
            self.conn.deregister();
        }
    }
}

// ============================================================================
// CoreRouter
// ============================================================================

/// Top-level router: cycle guard, deadline, route table and connection tracking
pub struct CoreRouter {
    routes: RwLock<Vec<Route>>,
    enroute: Mutex<HashSet<Nonce>>,
    conns: ConnSet,
    events: EventQueue,
    log_route_trace: AtomicBool,
    routing_timeout: Duration,
    shutdown: CancellationToken,
}

impl CoreRouter {
    /// Empty router publishing on `events`
    #[must_use]
    pub fn new(events: EventQueue) -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
            enroute: Mutex::new(HashSet::new()),
            conns: ConnSet::new(),
            events,
            log_route_trace: AtomicBool::new(false),
            routing_timeout: DEFAULT_ROUTING_TIMEOUT,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use a different routing ceiling
    #[must_use]
    pub fn with_routing_timeout(mut self, timeout: Duration) -> Self {
        self.routing_timeout = timeout;
        self
    }

    /// Routing ceiling applied to new queries
    #[must_use]
    pub fn routing_timeout(&self) -> Duration {
        self.routing_timeout
    }

    /// Add a route; re-adding the same `(caller, target, router)` only updates
    /// the priority
    pub fn add_route(&self, caller: Identity, target: Identity, router: Arc<dyn Router>, priority: i32) {
        let mut routes = self.routes.write();
        match routes.iter_mut().find(|r| r.is_entry(&caller, &target, &router)) {
            Some(existing) => existing.priority = priority,
            None => routes.push(Route {
                caller,
                target,
                router,
                priority,
            }),
        }
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Remove exactly the route `(caller, target, router)`
    pub fn remove_route(
        &self,
        caller: &Identity,
        target: &Identity,
        router: &Arc<dyn Router>,
    ) -> Result<(), RegistryError> {
        let mut routes = self.routes.write();
        let index = routes
            .iter()
            .position(|r| r.is_entry(caller, target, router))
            .ok_or_else(|| {
                RegistryError::NotFound(format!("route {} -> {} via {}", caller, target, router.name()))
            })?;
        routes.remove(index);
        Ok(())
    }

    /// Copy of the route table, highest priority first
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.routes.read().clone()
    }

    /// Registry of routed connections
    #[must_use]
    pub fn conns(&self) -> &ConnSet {
        &self.conns
    }

    /// Queue this router publishes connection events on
    #[must_use]
    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    /// Whether failed queries log the per-candidate trace
    #[must_use]
    pub fn log_route_trace(&self) -> bool {
        self.log_route_trace.load(Ordering::Relaxed)
    }

    /// Toggle per-candidate failure traces
    pub fn set_log_route_trace(&self, enabled: bool) {
        self.log_route_trace.store(enabled, Ordering::Relaxed);
    }

    /// Stop all connection watchers
    ///
    /// Connections stay open; no more `ConnRemoved` events are emitted.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn lock_nonce(&self, nonce: Nonce) -> Option<NonceGuard<'_>> {
        if self.enroute.lock().insert(nonce) {
            Some(NonceGuard {
                enroute: &self.enroute,
                nonce,
            })
        } else {
            None
        }
    }

    async fn reroute(
        &self,
        ctx: &RouteContext,
        query: &Query,
        caller: Arc<dyn Duplex>,
        hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError> {
        let conn = self
            .conns
            .find_by_nonce(query.nonce())
            .ok_or_else(|| RouteError::NotFound(format!("rerouted nonce {} does not exist", query.nonce())))?;

        if hints.update {
            conn.set_query(query.clone());
        }

        let hints = Hints {
            reroute: false,
            ..hints.clone()
        };
        ctx.guard(self.route_table(ctx, query, caller, &hints)).await
    }

    async fn route_monitored(
        &self,
        ctx: &RouteContext,
        query: &Query,
        caller: Arc<dyn Duplex>,
        hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError> {
        let conn = MonitoredConn::new(query.clone(), caller, hints.clone());

        // the nonce may still belong to an open connection from an earlier query
        self.conns
            .add(conn.clone())
            .map_err(|_| RouteError::RoutingCycle)?;

        let pending = PendingConn {
            conn: conn.clone(),
            armed: true,
        };

        let caller_monitor: Arc<dyn Duplex> = conn.caller();
        let target = ctx.guard(self.route_table(ctx, query, caller_monitor, hints)).await?;

        let target_monitor = match conn.attach_target(target) {
            Ok(monitor) => monitor,
            Err(target) => {
                if let Err(e) = target.close().await {
                    tracing::debug!(nonce = %query.nonce(), error = %e, "closing abandoned target failed");
                }
                return Err(RouteError::Aborted);
            }
        };
        pending.complete();

        self.events.emit(NodeEvent::ConnAdded { conn: conn.clone() });
        self.watch(conn);

        Ok(target_monitor)
    }

    fn watch(&self, conn: Arc<MonitoredConn>) {
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = conn.done() => {
                    conn.deregister();
                    events.emit(NodeEvent::ConnRemoved { conn });
                }
                () = shutdown.cancelled() => {}
            }
        });
    }

    async fn route_table(
        &self,
        ctx: &RouteContext,
        query: &Query,
        caller: Arc<dyn Duplex>,
        hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError> {
        if let Some(via) = &hints.via {
            let hints = Hints {
                via: None,
                ..hints.clone()
            };
            return via.route_query(ctx, query, caller, &hints).await;
        }

        let routes = match_routes(&self.routes(), query.caller(), query.target());
        let mut failures = Vec::with_capacity(routes.len());

        for route in routes {
            match route.router.route_query(ctx, query, caller.clone(), hints).await {
                Ok(target) => return Ok(target),
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => failures.push(RouteFailure::new(route.router.name(), e)),
            }
        }

        Err(RouteError::not_found(self.name(), failures))
    }

    fn log_outcome(&self, query: &Query, result: &Result<Arc<dyn Duplex>, RouteError>, elapsed: Duration) {
        let nonce = query.nonce();
        let elapsed = Duration::from_micros(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX));

        match result {
            Ok(target) => {
                let resolved = target.identity().unwrap_or_else(|| query.target().clone());
                tracing::info!(
                    nonce = %nonce,
                    "[{}] {} -> {}:{} routed in {:?}",
                    nonce,
                    query.caller(),
                    resolved,
                    query.query(),
                    elapsed
                );
            }
            Err(e) => {
                tracing::info!(
                    nonce = %nonce,
                    "[{}] {} -> {}:{} error ({:?}): {}",
                    nonce,
                    query.caller(),
                    query.target(),
                    query.query(),
                    elapsed,
                    e
                );
                if self.log_route_trace() {
                    if let Some(rnf) = e.as_route_not_found() {
                        for line in rnf.trace().lines().filter(|l| !l.is_empty()) {
                            tracing::debug!(nonce = %nonce, "[{}] {}", nonce, line);
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Router for CoreRouter {
    async fn route_query(
        &self,
        ctx: &RouteContext,
        query: &Query,
        caller: Arc<dyn Duplex>,
        hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError> {
        let mut silent = hints.silent;

        // a reroute may run while the original owner holds the nonce; it
        // only releases the nonce if it took it
        let _nonce = match self.lock_nonce(query.nonce()) {
            Some(guard) => Some(guard),
            None if hints.reroute => {
                silent = true;
                None
            }
            None => return Err(RouteError::RoutingCycle),
        };

        if !silent {
            tracing::debug!(
                nonce = %query.nonce(),
                "[{}] {} -> {}:{} routing...",
                query.nonce(),
                query.caller(),
                query.target(),
                query.query()
            );
        }

        let started_at = Instant::now();

        let result = if hints.reroute {
            self.reroute(ctx, query, caller, hints).await
        } else {
            let ctx = ctx.with_timeout(self.routing_timeout);
            self.route_monitored(&ctx, query, caller, hints).await
        };

        if !silent {
            self.log_outcome(query, &result, started_at.elapsed());
        }

        result
    }
}

impl std::fmt::Debug for CoreRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreRouter")
            .field("routes", &self.routes.read().len())
            .field("conns", &self.conns.len())
            .field("routing_timeout", &self.routing_timeout)
            .finish()
    }
}
