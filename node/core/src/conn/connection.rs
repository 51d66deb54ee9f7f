//! A routed connection and its two monitored halves

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::monitor::MonitoredWriter;
use super::set::ConnSet;
use crate::query::{Nonce, Query};
use crate::router::Hints;
use crate::stream::Duplex;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a [`MonitoredConn`]
///
/// ```text
///   Routing ──target attached──▶ Open ──one half closed──▶ Closing ──▶ Closed
///      └────────────caller closed before a target was found──────────────┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    /// No target yet
    Routing,
    /// Both halves open
    Open,
    /// One half closed
    Closing,
    /// Both halves closed
    Closed,
}

impl std::fmt::Display for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Routing => "routing",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Which half of a connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// Stream toward the caller
    Caller,
    /// Stream toward the resolved target
    Target,
}

#[derive(Default)]
struct Halves {
    target: Option<Arc<MonitoredWriter>>,
    caller_closed: bool,
    target_closed: bool,
}

/// A connection admitted by the dispatch engine
///
/// Created when a nonce is admitted for routing, before any target is known.
/// Closing either half closes the other one and removes the record from its
/// [`ConnSet`]; both happen at most once no matter how many times or from
/// how many tasks the halves are closed.
pub struct MonitoredConn {
    id: u64,
    nonce: Nonce,
    query: RwLock<Query>,
    hints: Hints,
    established_at: Instant,
    caller: Arc<MonitoredWriter>,
    halves: Mutex<Halves>,
    registry: Mutex<Option<ConnSet>>,
    done: CancellationToken,
}

impl MonitoredConn {
    /// Create a connection in the `Routing` state around the caller's stream
    pub fn new(query: Query, caller: Arc<dyn Duplex>, hints: Hints) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let caller = MonitoredWriter::with_hook(caller, Self::close_hook(weak.clone(), Side::Caller));
            Self {
                id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
                nonce: query.nonce(),
                query: RwLock::new(query),
                hints,
                established_at: Instant::now(),
                caller: Arc::new(caller),
                halves: Mutex::new(Halves::default()),
                registry: Mutex::new(None),
                done: CancellationToken::new(),
            }
        })
    }

    fn close_hook(conn: Weak<Self>, side: Side) -> super::monitor::CloseHook {
        Box::new(move || {
            Box::pin(async move {
                if let Some(conn) = conn.upgrade() {
                    conn.half_closed(side).await;
                }
            })
        })
    }

    /// Process-unique connection id
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Nonce this connection is registered under
    #[must_use]
    pub fn nonce(&self) -> Nonce {
        self.nonce
    }

    /// Current query (replaced by updating reroutes)
    #[must_use]
    pub fn query(&self) -> Query {
        self.query.read().clone()
    }

    pub(crate) fn set_query(&self, query: Query) {
        *self.query.write() = query;
    }

    /// Hints the connection was routed with
    #[must_use]
    pub fn hints(&self) -> &Hints {
        &self.hints
    }

    /// When routing started
    #[must_use]
    pub fn established_at(&self) -> Instant {
        self.established_at
    }

    /// Monitor on the caller's stream
    #[must_use]
    pub fn caller(&self) -> Arc<MonitoredWriter> {
        self.caller.clone()
    }

    /// Monitor on the target's stream, once routing succeeded
    #[must_use]
    pub fn target(&self) -> Option<Arc<MonitoredWriter>> {
        self.halves.lock().target.clone()
    }

    /// Bytes written toward the caller
    #[must_use]
    pub fn bytes_in(&self) -> u64 {
        self.caller.bytes()
    }

    /// Bytes written toward the target
    #[must_use]
    pub fn bytes_out(&self) -> u64 {
        self.target().map_or(0, |t| t.bytes())
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ConnState {
        let halves = self.halves.lock();
        let closed = usize::from(halves.caller_closed) + usize::from(halves.target_closed);
        match (&halves.target, closed) {
            (None, 0) => ConnState::Routing,
            (None, _) => ConnState::Closed,
            (Some(_), 0) => ConnState::Open,
            (Some(_), 1) => ConnState::Closing,
            (Some(_), _) => ConnState::Closed,
        }
    }

    /// Whether either half has started closing
    #[must_use]
    pub fn is_closing(&self) -> bool {
        let halves = self.halves.lock();
        halves.caller_closed || halves.target_closed
    }

    /// Whether both halves are closed
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Completes once both halves are closed
    pub async fn done(&self) {
        self.done.cancelled().await;
    }

    /// Attach the routed target and return its monitor
    ///
    /// Fails, handing the raw stream back, when the caller already closed.
    pub(crate) fn attach_target(
        self: &Arc<Self>,
        target: Arc<dyn Duplex>,
    ) -> Result<Arc<MonitoredWriter>, Arc<dyn Duplex>> {
        let mut halves = self.halves.lock();
        if halves.caller_closed {
            return Err(target);
        }
        let monitor = Arc::new(MonitoredWriter::with_hook(
            target,
            Self::close_hook(Arc::downgrade(self), Side::Target),
        ));
        halves.target = Some(monitor.clone());
        Ok(monitor)
    }

    pub(crate) fn set_registry(&self, set: ConnSet) {
        *self.registry.lock() = Some(set);
    }

    /// Remove from the registry; later calls are no-ops
    pub(crate) fn deregister(&self) {
        let set = self.registry.lock().take();
        if let Some(set) = set {
            set.remove(self);
        }
    }

    async fn half_closed(self: Arc<Self>, side: Side) {
        let sibling = {
            let mut halves = self.halves.lock();
            match side {
                Side::Caller => {
                    halves.caller_closed = true;
                    halves.target.clone()
                }
                Side::Target => {
                    halves.target_closed = true;
                    Some(self.caller.clone())
                }
            }
        };

        self.deregister();

        if let Some(sibling) = sibling {
            if let Err(e) = sibling.close().await {
                debug!(nonce = %self.nonce, error = %e, "sibling close failed");
            }
        }

        let finished = {
            let halves = self.halves.lock();
            halves.caller_closed && (halves.target_closed || halves.target.is_none())
        };
        if finished {
            self.done.cancel();
        }
    }
}

impl std::fmt::Debug for MonitoredConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoredConn")
            .field("id", &self.id)
            .field("nonce", &self.nonce)
            .field("state", &self.state())
            .field("bytes_in", &self.bytes_in())
            .field("bytes_out", &self.bytes_out())
            .finish()
    }
}
