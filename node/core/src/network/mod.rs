//! Link Management
//!
//! The network layer turns "reach identity X" into an active transport link
//! and keeps the route table in sync with the set of links.
//!
//! # Link Race
//!
//! ```text
//!   link(ctx, X)
//!     ├── tcp linker  ──────────────✗ unreachable
//!     ├── tor linker  ─────────✓ first success: take slot, cancel race
//!     └── bt linker   ───────────────────✓ too late: close own link
//!
//!   winner ──▶ add_link ──▶ route (self, X) -> LinkRouter at fixed priority
//!                       └─▶ lifetime task: run() ... remove route, emit LinkRemoved
//! ```
//!
//! Linkers run concurrently with no ordering between them.

mod link;
mod link_set;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::context::RouteContext;
use crate::events::{EventQueue, NodeEvent};
use crate::identity::Identity;
use crate::router::CoreRouter;

pub use link::{Link, LinkError, LinkRouter, Linker};
pub use link_set::{ActiveLink, LinkSet};

/// Priority of per-link routes unless configured otherwise
pub const DEFAULT_LINK_ROUTE_PRIORITY: i32 = 50;

/// Errors from the network layer
#[derive(Debug, Error)]
pub enum NetworkError {
    /// No link strategies are registered
    #[error("no linkers registered")]
    NoLinkers,

    /// Every linker failed
    #[error("all link attempts failed: {}", describe_failures(.0))]
    AllFailed(Vec<(String, LinkError)>),

    /// Links can only be added while the network runs
    #[error("network is not running")]
    NotRunning,

    /// `run` was called twice
    #[error("network is already running")]
    AlreadyRunning,

    /// The link's local identity is not this node's identity
    #[error("link local identity does not match node identity")]
    IdentityMismatch,

    /// The same link instance was added twice
    #[error("link already added")]
    DuplicateLink,

    /// No link with this id
    #[error("link {0} not found")]
    LinkNotFound(u64),
}

fn describe_failures(failures: &[(String, LinkError)]) -> String {
    failures
        .iter()
        .map(|(linker, e)| format!("{linker}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Links for one node identity
pub struct Network {
    identity: Identity,
    router: Arc<CoreRouter>,
    events: EventQueue,
    linkers: RwLock<Vec<Arc<dyn Linker>>>,
    links: Arc<LinkSet>,
    tasks: Mutex<JoinSet<()>>,
    run_ctx: Mutex<Option<RouteContext>>,
    running: AtomicBool,
    link_route_priority: i32,
}

impl Network {
    /// Network for `identity`, registering link routes in `router`
    pub fn new(identity: Identity, router: Arc<CoreRouter>, events: EventQueue) -> Self {
        Self {
            identity,
            router,
            events,
            linkers: RwLock::new(Vec::new()),
            links: Arc::new(LinkSet::new()),
            tasks: Mutex::new(JoinSet::new()),
            run_ctx: Mutex::new(None),
            running: AtomicBool::new(false),
            link_route_priority: DEFAULT_LINK_ROUTE_PRIORITY,
        }
    }

    /// Use a different priority for per-link routes
    #[must_use]
    pub fn with_link_route_priority(mut self, priority: i32) -> Self {
        self.link_route_priority = priority;
        self
    }

    /// Register a link strategy
    pub fn add_linker(&self, linker: Arc<dyn Linker>) {
        tracing::debug!(linker = %linker.name(), "linker added");
        self.linkers.write().push(linker);
    }

    /// Names of the registered strategies
    #[must_use]
    pub fn linkers(&self) -> Vec<String> {
        self.linkers.read().iter().map(|l| l.name()).collect()
    }

    /// Active links, oldest first
    #[must_use]
    pub fn links(&self) -> Vec<Arc<ActiveLink>> {
        self.links.all()
    }

    /// The underlying link registry
    #[must_use]
    pub fn link_set(&self) -> &LinkSet {
        &self.links
    }

    /// Whether `run` is in progress
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Race every linker toward `target` and add the first link to succeed
    ///
    /// Linkers that succeed after the winner close their link. Returns once
    /// every linker has finished.
    pub async fn link(&self, ctx: &RouteContext, target: &Identity) -> Result<Arc<ActiveLink>, NetworkError> {
        let linkers = self.linkers.read().clone();
        if linkers.is_empty() {
            return Err(NetworkError::NoLinkers);
        }

        let race = ctx.child();
        let winner: Arc<Mutex<Option<Arc<dyn Link>>>> = Arc::new(Mutex::new(None));
        let mut attempts = JoinSet::new();

        for linker in linkers {
            let race = race.clone();
            let winner = winner.clone();
            let target = target.clone();
            attempts.spawn(async move {
                let name = linker.name();
                let link = linker.link(&race, &target).await.map_err(|e| (name.clone(), e))?;

                let late = {
                    let mut slot = winner.lock();
                    if slot.is_none() {
                        *slot = Some(link.clone());
                        race.cancel();
                        None
                    } else {
                        Some(link)
                    }
                };

                if let Some(link) = late {
                    tracing::debug!(linker = %name, "link race lost, closing");
                    if let Err(e) = link.close().await {
                        tracing::debug!(linker = %name, error = %e, "closing losing link failed");
                    }
                }
                Ok::<(), (String, LinkError)>(())
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(failure)) => failures.push(failure),
                Err(e) => failures.push(("linker".to_string(), LinkError::Io(e.to_string()))),
            }
        }

        let link = winner.lock().take();
        let Some(link) = link else {
            return Err(NetworkError::AllFailed(failures));
        };

        match self.add_link(link.clone()) {
            Ok(active) => Ok(active),
            Err(e) => {
                if let Err(close_err) = link.close().await {
                    tracing::debug!(error = %close_err, "closing rejected link failed");
                }
                Err(e)
            }
        }
    }

    /// Adopt an established link
    ///
    /// Registers the `(local, remote) -> link` route and starts the task that
    /// runs the link and cleans up after it.
    pub fn add_link(&self, link: Arc<dyn Link>) -> Result<Arc<ActiveLink>, NetworkError> {
        // held until the lifetime task is spawned so that `run` cannot miss it
        let run_ctx = self.run_ctx.lock();
        let ctx = run_ctx.clone().ok_or(NetworkError::NotRunning)?;

        if !link.local_identity().is_equal(&self.identity) {
            return Err(NetworkError::IdentityMismatch);
        }

        let active = self.links.add(link.clone())?;
        self.router.add_route(
            link.local_identity(),
            link.remote_identity(),
            active.router().clone(),
            self.link_route_priority,
        );

        tracing::info!(
            link_id = active.id(),
            remote = %link.remote_identity(),
            network = link.network(),
            "added link {} with {} ({})",
            active.id(),
            link.remote_identity(),
            link.network()
        );
        self.events.emit(NodeEvent::LinkAdded { link: active.clone() });

        let router = self.router.clone();
        let links = self.links.clone();
        let events = self.events.clone();
        let lifetime = active.clone();
        let mut tasks = self.tasks.lock();
        // reap lifetimes of links that already ended
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let result = lifetime.link().run(&ctx).await;

            let link = lifetime.link();
            if let Err(e) = link.close().await {
                tracing::debug!(link_id = lifetime.id(), error = %e, "closing finished link failed");
            }
            if let Err(e) = router.remove_route(&link.local_identity(), &link.remote_identity(), lifetime.router()) {
                tracing::warn!(link_id = lifetime.id(), error = %e, "link route already gone");
            }
            if let Err(e) = links.remove(lifetime.id()) {
                tracing::warn!(link_id = lifetime.id(), error = %e, "link already removed");
            }

            let reason = result.err().map(|e| e.to_string());
            tracing::info!(
                link_id = lifetime.id(),
                remote = %link.remote_identity(),
                reason = ?reason,
                "removed link {} with {}",
                lifetime.id(),
                link.remote_identity()
            );
            events.emit(NodeEvent::LinkRemoved { link: lifetime, reason });
        });

        Ok(active)
    }

    #[cfg(test)]
    fn lifetime_tasks(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Run until `ctx` ends, then close every link and wait for cleanup
    pub async fn run(&self, ctx: &RouteContext) -> Result<(), NetworkError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(NetworkError::AlreadyRunning);
        }
        *self.run_ctx.lock() = Some(ctx.child());

        ctx.done().await;

        // no new links past this point
        self.run_ctx.lock().take();

        let links = self.links.all();
        tracing::info!(count = links.len(), "closing all links...");
        for active in links {
            if let Err(e) = active.link().close().await {
                tracing::warn!(link_id = active.id(), error = %e, "link close failed");
            }
        }

        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        while tasks.join_next().await.is_some() {}

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("identity", &self.identity)
            .field("linkers", &self.linkers())
            .field("links", &self.links.len())
            .field("running", &self.is_running())
            .finish()
    }
}
