//! Built-in Local Services
//!
//! | Service     | Behavior                                              |
//! |-------------|-------------------------------------------------------|
//! | `echo`      | every chunk the caller writes is written back to it   |
//! | `node.info` | writes a JSON summary of the node to the caller       |

use std::io;
use std::sync::{Arc, Weak};

use async_trait::async_trait;

use overlay_core::router::{Hints, Router};
use overlay_core::{Duplex, Identity, Node, Query, RouteContext, RouteError};

/// Register the built-in services on `node`
pub fn register(node: &Arc<Node>) -> anyhow::Result<()> {
    node.add_service("echo", Arc::new(EchoService))?;
    node.add_service(
        "node.info",
        Arc::new(InfoService {
            node: Arc::downgrade(node),
        }),
    )?;
    Ok(())
}

// ============================================================================
// echo
// ============================================================================

/// Reflects the caller's writes back at the caller
pub struct EchoService;

#[async_trait]
impl Router for EchoService {
    async fn route_query(
        &self,
        _ctx: &RouteContext,
        query: &Query,
        caller: Arc<dyn Duplex>,
        _hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError> {
        tracing::debug!(nonce = %query.nonce(), caller = %query.caller(), "echo session");
        Ok(Arc::new(EchoStream {
            identity: query.target().clone(),
            caller,
        }))
    }

    fn name(&self) -> String {
        "echo".to_string()
    }
}

struct EchoStream {
    identity: Identity,
    caller: Arc<dyn Duplex>,
}

#[async_trait]
impl Duplex for EchoStream {
    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.caller.write(buf).await
    }

    async fn close(&self) -> io::Result<()> {
        Ok(())
    }

    fn identity(&self) -> Option<Identity> {
        Some(self.identity.clone())
    }
}

// ============================================================================
// node.info
// ============================================================================

/// Answers with [`overlay_core::NodeInfo`] as JSON
pub struct InfoService {
    node: Weak<Node>,
}

#[async_trait]
impl Router for InfoService {
    async fn route_query(
        &self,
        _ctx: &RouteContext,
        query: &Query,
        caller: Arc<dyn Duplex>,
        _hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError> {
        let node = self.node.upgrade().ok_or(RouteError::Aborted)?;

        let mut body = serde_json::to_vec_pretty(&node.info()).map_err(|e| {
            tracing::warn!(error = %e, "failed to encode node info");
            RouteError::Aborted
        })?;
        body.push(b'\n');

        caller.write(&body).await.map_err(|e| {
            tracing::debug!(nonce = %query.nonce(), error = %e, "node.info caller went away");
            RouteError::Aborted
        })?;

        Ok(Arc::new(ReadOnlyStream {
            identity: node.identity().clone(),
        }))
    }

    fn name(&self) -> String {
        "node.info".to_string()
    }
}

/// Target half of a service that takes no input
struct ReadOnlyStream {
    identity: Identity,
}

#[async_trait]
impl Duplex for ReadOnlyStream {
    async fn write(&self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "service takes no input"))
    }

    async fn close(&self) -> io::Result<()> {
        Ok(())
    }

    fn identity(&self) -> Option<Identity> {
        Some(self.identity.clone())
    }
}
