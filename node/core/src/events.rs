//! Node Events
//!
//! State changes in the router and the network are published on an
//! [`EventQueue`]. Delivery is best effort: emitting with nobody listening is
//! fine, and a subscriber that falls behind loses the oldest events.
//!
//! Events are emitted after the state change they describe, possibly from
//! another task, so subscribers must not assume they see the change as it
//! happens.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::conn::MonitoredConn;
use crate::network::ActiveLink;

/// Default buffer size of an [`EventQueue`]
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Something that happened inside the node
#[derive(Clone, Debug)]
pub enum NodeEvent {
    /// A query was routed and its connection is open
    ConnAdded {
        /// The new connection
        conn: Arc<MonitoredConn>,
    },
    /// A routed connection has fully closed
    ConnRemoved {
        /// The closed connection
        conn: Arc<MonitoredConn>,
    },
    /// A transport link joined the network
    LinkAdded {
        /// The new link
        link: Arc<ActiveLink>,
    },
    /// A transport link left the network
    LinkRemoved {
        /// The departed link
        link: Arc<ActiveLink>,
        /// Why its run loop ended, if it ended with an error
        reason: Option<String>,
    },
}

impl NodeEvent {
    /// Short event name for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnAdded { .. } => "conn_added",
            Self::ConnRemoved { .. } => "conn_removed",
            Self::LinkAdded { .. } => "link_added",
            Self::LinkRemoved { .. } => "link_removed",
        }
    }
}

/// Broadcast point for [`NodeEvent`]s
#[derive(Clone, Debug)]
pub struct EventQueue {
    tx: broadcast::Sender<NodeEvent>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventQueue {
    /// Queue buffering up to `capacity` events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; returns how many subscribers will see it
    pub fn emit(&self, event: NodeEvent) -> usize {
        tracing::trace!(kind = event.kind(), "event");
        self.tx.send(event).unwrap_or(0)
    }

    /// New subscriber seeing every event emitted from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.tx.subscribe()
    }

    /// Subscriber as a `Stream`; lag shows up as `Err` items
    #[must_use]
    pub fn stream(&self) -> BroadcastStream<NodeEvent> {
        BroadcastStream::new(self.subscribe())
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
