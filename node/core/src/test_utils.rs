//! Test doubles for routers, links and linkers

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::context::RouteContext;
use crate::error::RouteError;
use crate::identity::Identity;
use crate::network::{Link, LinkError, Linker};
use crate::query::Query;
use crate::router::{Hints, Router};
use crate::stream::{pipe, Duplex};

// ============================================================================
// MockRouter
// ============================================================================

/// What a [`MockRouter`] does when asked to route
#[derive(Clone, Debug)]
pub enum MockRouterBehavior {
    /// Return a fresh in-memory stream for the query's target
    Accept,
    /// Fail with this error
    Fail(RouteError),
    /// Never return
    Hang,
}

/// Router that records its calls
pub struct MockRouter {
    name: String,
    behavior: MockRouterBehavior,
    calls: AtomicUsize,
    last_call_at: Mutex<Option<Instant>>,
    queries: Mutex<Vec<Query>>,
    receivers: Mutex<Vec<mpsc::Receiver<Vec<u8>>>>,
}

impl MockRouter {
    pub fn new(name: &str, behavior: MockRouterBehavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
            last_call_at: Mutex::new(None),
            queries: Mutex::new(Vec::new()),
            receivers: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_call_at(&self) -> Option<Instant> {
        *self.last_call_at.lock()
    }

    pub fn queries(&self) -> Vec<Query> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl Router for MockRouter {
    async fn route_query(
        &self,
        _ctx: &RouteContext,
        query: &Query,
        _caller: Arc<dyn Duplex>,
        _hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_call_at.lock() = Some(Instant::now());
        self.queries.lock().push(query.clone());

        match &self.behavior {
            MockRouterBehavior::Accept => {
                let (writer, rx) = pipe(Some(query.target().clone()), 16);
                self.receivers.lock().push(rx);
                Ok(Arc::new(writer))
            }
            MockRouterBehavior::Fail(e) => Err(e.clone()),
            MockRouterBehavior::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

// ============================================================================
// MockLink
// ============================================================================

/// Link whose `run` returns when closed
pub struct MockLink {
    local: Identity,
    remote: Identity,
    network: String,
    closed: AtomicBool,
    close_signal: Notify,
}

impl MockLink {
    pub fn new(local: Identity, remote: Identity, network: &str) -> Arc<Self> {
        Arc::new(Self {
            local,
            remote,
            network: network.to_string(),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Router for MockLink {
    async fn route_query(
        &self,
        _ctx: &RouteContext,
        query: &Query,
        _caller: Arc<dyn Duplex>,
        _hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError> {
        let (writer, _rx) = pipe(Some(query.target().clone()), 1);
        Ok(Arc::new(writer))
    }
}

#[async_trait]
impl Link for MockLink {
    fn local_identity(&self) -> Identity {
        self.local.clone()
    }

    fn remote_identity(&self) -> Identity {
        self.remote.clone()
    }

    fn network(&self) -> &str {
        &self.network
    }

    async fn run(&self, ctx: &RouteContext) -> Result<(), LinkError> {
        if self.is_closed() {
            return Ok(());
        }
        tokio::select! {
            () = self.close_signal.notified() => Ok(()),
            () = ctx.done() => Err(LinkError::Cancelled),
        }
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.closed.store(true, Ordering::SeqCst);
        self.close_signal.notify_one();
        Ok(())
    }
}

// ============================================================================
// MockLinker
// ============================================================================

/// Linker that answers after a fixed delay
pub struct MockLinker {
    name: String,
    delay: Duration,
    succeed: bool,
    local: Identity,
    produced: Mutex<Vec<Arc<MockLink>>>,
}

impl MockLinker {
    pub fn succeeding(name: &str, local: Identity, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            delay,
            succeed: true,
            local,
            produced: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            delay,
            succeed: false,
            local: Identity::anyone(),
            produced: Mutex::new(Vec::new()),
        })
    }

    pub fn produced(&self) -> Vec<Arc<MockLink>> {
        self.produced.lock().clone()
    }
}

#[async_trait]
impl Linker for MockLinker {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn link(&self, _ctx: &RouteContext, target: &Identity) -> Result<Arc<dyn Link>, LinkError> {
        tokio::time::sleep(self.delay).await;
        if !self.succeed {
            return Err(LinkError::Unreachable(self.name.clone()));
        }
        let link = MockLink::new(self.local.clone(), target.clone(), &self.name);
        self.produced.lock().push(link.clone());
        Ok(link)
    }
}
