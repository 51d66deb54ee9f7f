//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use overlay_core::router::{Hints, Router};
use overlay_core::stream::pipe;
use overlay_core::{Duplex, Identity, Link, LinkError, Linker, Query, RouteContext, RouteError};

/// Caller stream plus the receiver of everything routed back to it
pub fn caller() -> (Arc<dyn Duplex>, mpsc::Receiver<Vec<u8>>) {
    let (writer, rx) = pipe(None, 16);
    (Arc::new(writer), rx)
}

// ============================================================================
// Recording router
// ============================================================================

pub enum Behavior {
    Accept,
    Fail(RouteError),
    Hang,
    /// Close the caller stream, then accept
    CloseCaller,
}

/// Router that records every query it sees
pub struct RecordingRouter {
    name: String,
    behavior: Behavior,
    calls: AtomicUsize,
    queries: Mutex<Vec<Query>>,
    targets: Mutex<Vec<mpsc::Receiver<Vec<u8>>>>,
}

impl RecordingRouter {
    pub fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            targets: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<Query> {
        self.queries.lock().clone()
    }

    /// Receiver of the n-th accepted target stream
    pub fn take_target(&self, n: usize) -> mpsc::Receiver<Vec<u8>> {
        self.targets.lock().remove(n)
    }
}

#[async_trait]
impl Router for RecordingRouter {
    async fn route_query(
        &self,
        _ctx: &RouteContext,
        query: &Query,
        caller: Arc<dyn Duplex>,
        _hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.clone());
        match &self.behavior {
            Behavior::Accept => {
                let (writer, rx) = pipe(Some(query.target().clone()), 16);
                self.targets.lock().push(rx);
                Ok(Arc::new(writer))
            }
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::Hang => std::future::pending().await,
            Behavior::CloseCaller => {
                caller.close().await.map_err(|e| RouteError::NotFound(e.to_string()))?;
                let (writer, rx) = pipe(Some(query.target().clone()), 16);
                self.targets.lock().push(rx);
                Ok(Arc::new(writer))
            }
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

// ============================================================================
// Links
// ============================================================================

/// In-memory link that runs until closed or until its context ends
pub struct TestLink {
    local: Identity,
    remote: Identity,
    network: String,
    closed: AtomicBool,
    fail_with: Mutex<Option<LinkError>>,
    stop: Notify,
}

impl TestLink {
    pub fn new(local: Identity, remote: Identity, network: &str) -> Arc<Self> {
        Arc::new(Self {
            local,
            remote,
            network: network.to_string(),
            closed: AtomicBool::new(false),
            fail_with: Mutex::new(None),
            stop: Notify::new(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// End `run` with an error, as a dropped transport would
    pub fn fail(&self, error: LinkError) {
        *self.fail_with.lock() = Some(error);
        self.stop.notify_one();
    }
}

#[async_trait]
impl Router for TestLink {
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
impl Link for TestLink {
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
        if !self.is_closed() {
            tokio::select! {
                () = self.stop.notified() => {}
                () = ctx.done() => return Err(LinkError::Cancelled),
            }
        }
        match self.fail_with.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.closed.store(true, Ordering::SeqCst);
        self.stop.notify_one();
        Ok(())
    }
}

/// Linker that answers after a fixed delay, honoring cancellation
pub struct DelayedLinker {
    name: String,
    delay: Duration,
    local: Option<Identity>,
    produced: Mutex<Vec<Arc<TestLink>>>,
}

impl DelayedLinker {
    pub fn succeeding(name: &str, local: Identity, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            delay,
            local: Some(local),
            produced: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            delay,
            local: None,
            produced: Mutex::new(Vec::new()),
        })
    }

    pub fn produced(&self) -> Vec<Arc<TestLink>> {
        self.produced.lock().clone()
    }
}

#[async_trait]
impl Linker for DelayedLinker {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn link(&self, _ctx: &RouteContext, target: &Identity) -> Result<Arc<dyn Link>, LinkError> {
        // finishes even when the race is over, so late winners can be observed
        tokio::time::sleep(self.delay).await;
        let Some(local) = &self.local else {
            return Err(LinkError::Unreachable(self.name.clone()));
        };
        let link = TestLink::new(local.clone(), target.clone(), &self.name);
        self.produced.lock().push(link.clone());
        Ok(link)
    }
}
