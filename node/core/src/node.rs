//! Node Assembly
//!
//! A [`Node`] ties one identity to one dispatch engine, one network and one
//! table of local services:
//!
//! ```text
//!   Node
//!   ├── CoreRouter
//!   │     ├── (anyone, self) -> local services   local_route_priority
//!   │     └── (self, peer)   -> LinkRouter       link_route_priority
//!   ├── Network   (linkers, active links)
//!   ├── PrefixRouter  (exclusive, params enabled)
//!   └── EventQueue
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::config::{ConfigError, NodeConfig};
use crate::context::RouteContext;
use crate::error::{RegistryError, RouteError};
use crate::events::EventQueue;
use crate::identity::Identity;
use crate::network::{Network, NetworkError};
use crate::query::Query;
use crate::router::{CoreRouter, Hints, PrefixRouter, Router};
use crate::stream::Duplex;

/// One overlay node
pub struct Node {
    identity: Identity,
    config: NodeConfig,
    router: Arc<CoreRouter>,
    network: Arc<Network>,
    services: Arc<PrefixRouter>,
    events: EventQueue,
    started_at: Instant,
}

impl Node {
    /// Build a node from configuration
    ///
    /// Generates an identity when the configuration has none.
    pub fn new(config: NodeConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let identity = config.node.identity.clone().unwrap_or_else(Identity::generate);
        if identity.is_anyone() {
            return Err(ConfigError::ValidationError(
                "node identity cannot be the wildcard".to_string(),
            ));
        }

        let events = EventQueue::new(config.network.event_capacity);
        let router = Arc::new(CoreRouter::new(events.clone()).with_routing_timeout(config.routing_timeout()));
        router.set_log_route_trace(config.routing.log_route_trace);

        let services = Arc::new(PrefixRouter::new(true).with_params(config.routing.params_enabled));
        router.add_route(
            Identity::anyone(),
            identity.clone(),
            services.clone(),
            config.routing.local_route_priority,
        );

        let network = Arc::new(
            Network::new(identity.clone(), router.clone(), events.clone())
                .with_link_route_priority(config.network.link_route_priority),
        );

        tracing::info!(identity = %identity, "node created");

        Ok(Self {
            identity,
            config,
            router,
            network,
            services,
            events,
            started_at: Instant::now(),
        })
    }

    /// This node's identity
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Dispatch engine
    #[must_use]
    pub fn router(&self) -> &Arc<CoreRouter> {
        &self.router
    }

    /// Link management
    #[must_use]
    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// Local service table
    #[must_use]
    pub fn services(&self) -> &Arc<PrefixRouter> {
        &self.services
    }

    /// Node-wide event queue
    #[must_use]
    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    /// Register a local service (`name` or `prefix*`)
    pub fn add_service(&self, name: &str, router: Arc<dyn Router>) -> Result<(), RegistryError> {
        self.services.add_route(name, router)?;
        tracing::debug!(service = name, "service registered");
        Ok(())
    }

    /// Route a query through the dispatch engine
    pub async fn route(
        &self,
        ctx: &RouteContext,
        query: &Query,
        caller: Arc<dyn Duplex>,
        hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError> {
        self.router.route_query(ctx, query, caller, hints).await
    }

    /// Run until `ctx` is cancelled, then close links and stop watchers
    pub async fn run(&self, ctx: &RouteContext) -> Result<(), NetworkError> {
        tracing::info!(identity = %self.identity, "node running");
        let result = self.network.run(ctx).await;
        self.router.shutdown();
        tracing::info!(identity = %self.identity, "node stopped");
        result
    }

    /// Snapshot of routes, connections and links
    #[must_use]
    pub fn info(&self) -> NodeInfo {
        NodeInfo {
            identity: self.identity.to_string(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            services: self.services.routes(),
            routes: self
                .router
                .routes()
                .iter()
                .map(|r| RouteInfo {
                    caller: r.caller.to_string(),
                    target: r.target.to_string(),
                    router: r.router.name(),
                    priority: r.priority,
                })
                .collect(),
            conns: self
                .router
                .conns()
                .all()
                .iter()
                .map(|c| ConnInfo {
                    id: c.id(),
                    nonce: c.nonce().to_string(),
                    query: c.query().query().to_string(),
                    state: c.state().to_string(),
                    bytes_in: c.bytes_in(),
                    bytes_out: c.bytes_out(),
                })
                .collect(),
            links: self
                .network
                .links()
                .iter()
                .map(|l| LinkInfo {
                    id: l.id(),
                    remote: l.remote_identity().to_string(),
                    network: l.link().network().to_string(),
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("identity", &self.identity)
            .field("router", &self.router)
            .field("network", &self.network)
            .finish()
    }
}

/// Serializable node summary
#[derive(Clone, Debug, Serialize)]
pub struct NodeInfo {
    /// Node identity
    pub identity: String,
    /// Seconds since the node was created
    pub uptime_secs: u64,
    /// Local service names
    pub services: Vec<String>,
    /// Route table, highest priority first
    pub routes: Vec<RouteInfo>,
    /// Open connections
    pub conns: Vec<ConnInfo>,
    /// Active links
    pub links: Vec<LinkInfo>,
}

/// Route table entry in a [`NodeInfo`]
#[derive(Clone, Debug, Serialize)]
pub struct RouteInfo {
    /// Caller pattern
    pub caller: String,
    /// Target pattern
    pub target: String,
    /// Router name
    pub router: String,
    /// Priority
    pub priority: i32,
}

/// Connection in a [`NodeInfo`]
#[derive(Clone, Debug, Serialize)]
pub struct ConnInfo {
    /// Connection id
    pub id: u64,
    /// Routing nonce
    pub nonce: String,
    /// Query string
    pub query: String,
    /// Lifecycle state
    pub state: String,
    /// Bytes written toward the caller
    pub bytes_in: u64,
    /// Bytes written toward the target
    pub bytes_out: u64,
}

/// Link in a [`NodeInfo`]
#[derive(Clone, Debug, Serialize)]
pub struct LinkInfo {
    /// Link id
    pub id: u64,
    /// Remote identity
    pub remote: String,
    /// Transport name
    pub network: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::pipe;
    use crate::test_utils::{MockRouter, MockRouterBehavior};

    #[test]
    fn test_new_installs_local_route() {
        let node = Node::new(NodeConfig::default()).unwrap();
        let routes = node.router().routes();
        assert_eq!(routes.len(), 1);
        assert!(routes[0].caller.is_anyone());
        assert_eq!(&routes[0].target, node.identity());
        assert_eq!(routes[0].priority, 100);
    }

    #[test]
    fn test_configured_identity_and_trace() {
        let id = Identity::generate();
        let mut config = NodeConfig::default();
        config.node.identity = Some(id.clone());
        config.routing.log_route_trace = true;

        let node = Node::new(config).unwrap();
        assert_eq!(node.identity(), &id);
        assert!(node.router().log_route_trace());
    }

    #[test]
    fn test_wildcard_identity_rejected() {
        let mut config = NodeConfig::default();
        config.node.identity = Some(Identity::anyone());
        assert!(matches!(Node::new(config), Err(ConfigError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_local_service_dispatch() {
        let node = Node::new(NodeConfig::default()).unwrap();
        let echo = MockRouter::new("echo", MockRouterBehavior::Accept);
        node.add_service("echo", echo.clone()).unwrap();

        let (caller, _rx) = pipe(None, 1);
        let query = Query::new(Identity::generate(), node.identity().clone(), "echo?x=1");
        node.route(&RouteContext::new(), &query, Arc::new(caller), &Hints::default())
            .await
            .unwrap();
        assert_eq!(echo.calls(), 1);

        // the local table is exclusive
        let (caller, _rx) = pipe(None, 1);
        let unknown = Query::new(Identity::generate(), node.identity().clone(), "missing");
        let res = node
            .route(&RouteContext::new(), &unknown, Arc::new(caller), &Hints::default())
            .await;
        assert!(matches!(res, Err(RouteError::Rejected)));

        let info = node.info();
        assert_eq!(info.services, vec!["echo".to_string()]);
        assert_eq!(info.conns.len(), 1);
    }
}
