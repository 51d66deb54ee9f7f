//! Transport link contracts

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::context::RouteContext;
use crate::error::RouteError;
use crate::identity::Identity;
use crate::query::Query;
use crate::router::{Hints, Router};
use crate::stream::Duplex;

/// Why a single link attempt or a link's run loop failed
#[derive(Debug, Clone, Error)]
pub enum LinkError {
    /// The peer could not be reached over this transport
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The transport connected but the handshake failed
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The attempt was cancelled
    #[error("link attempt cancelled")]
    Cancelled,

    /// Transport I/O error
    #[error("i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// An established transport connection between two identities
///
/// A link routes queries to its remote end, so it is also a [`Router`].
#[async_trait]
pub trait Link: Router {
    /// Our end of the link
    fn local_identity(&self) -> Identity;

    /// The peer's end of the link
    fn remote_identity(&self) -> Identity;

    /// Transport name, e.g. `tcp` or `tor`
    fn network(&self) -> &str;

    /// Serve the link; returns when the link dies or `ctx` ends
    async fn run(&self, ctx: &RouteContext) -> Result<(), LinkError>;

    /// Tear the link down, making `run` return
    async fn close(&self) -> Result<(), LinkError>;
}

/// A strategy for establishing links, one per transport
#[async_trait]
pub trait Linker: Send + Sync {
    /// Strategy name for logs
    fn name(&self) -> String;

    /// Try to establish a link to `target`; should give up when `ctx` ends
    async fn link(&self, ctx: &RouteContext, target: &Identity) -> Result<Arc<dyn Link>, LinkError>;
}

/// Route-table adapter for a link
pub struct LinkRouter(pub Arc<dyn Link>);

#[async_trait]
impl Router for LinkRouter {
    async fn route_query(
        &self,
        ctx: &RouteContext,
        query: &Query,
        caller: Arc<dyn Duplex>,
        hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError> {
        self.0.route_query(ctx, query, caller, hints).await
    }

    fn name(&self) -> String {
        format!("LinkRouter({})", self.0.network())
    }
}
