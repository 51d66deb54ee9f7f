//! Overlay Core - Query Routing for an Identity-Addressed Overlay Node
//!
//! Peers are addressed by public key, not by network address. Applications
//! open *queries* (named service requests) from one identity to another, and
//! this crate decides who handles each one: a local service, or an outbound
//! transport link toward the target.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              Node                                │
//! │                                                                  │
//! │   query ──▶ ┌──────────────────────────────────────────────┐     │
//! │             │                 CoreRouter                   │     │
//! │             │  nonce guard ─▶ 60s deadline ─▶ route table  │     │
//! │             └───────┬───────────────────────────┬──────────┘     │
//! │                     │ (anyone, self)            │ (self, peer)   │
//! │            ┌────────▼────────┐         ┌────────▼────────┐       │
//! │            │  PrefixRouter   │         │   LinkRouter    │       │
//! │            │ local services  │         │  active links   │       │
//! │            └─────────────────┘         └────────▲────────┘       │
//! │                                                 │                │
//! │   ConnSet (nonce -> MonitoredConn)     Network (link race)       │
//! │                                                                  │
//! │   EventQueue: ConnAdded / ConnRemoved / LinkAdded / LinkRemoved  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Router`]: the single routing operation every component implements
//! - [`CoreRouter`]: the dispatch engine (cycle guard, timeout, route table)
//! - [`PriorityRouter`] / [`PrefixRouter`]: composite routers
//! - [`ConnSet`] / [`MonitoredConn`]: tracking of routed connections
//! - [`Network`]: link race and link lifetime management
//! - [`Node`]: everything above wired to one identity
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use overlay_core::{Hints, Identity, Node, NodeConfig, Query, RouteContext};
//!
//! let node = Node::new(NodeConfig::default())?;
//! node.services().add_route_fn("echo", |_ctx, _query, caller, _hints| async move {
//!     Ok(caller)
//! })?;
//!
//! let (caller, mut rx) = overlay_core::stream::pipe(None, 16);
//! let query = Query::new(Identity::generate(), node.identity().clone(), "echo");
//! let target = node
//!     .route(&RouteContext::new(), &query, Arc::new(caller), &Hints::default())
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod conn;
pub mod context;
pub mod error;
pub mod events;
pub mod identity;
pub mod network;
pub mod node;
pub mod query;
pub mod router;
pub mod stream;

#[cfg(test)]
#[allow(missing_docs)]
pub(crate) mod test_utils;

pub use config::{load_config, load_config_from_path, ConfigError, ConfigSource, NodeConfig};
pub use conn::{ConnSet, ConnState, MonitoredConn, MonitoredWriter};
pub use context::RouteContext;
pub use error::{RegistryError, RouteError, RouteFailure, RouteNotFound};
pub use events::{EventQueue, NodeEvent};
pub use identity::Identity;
pub use network::{ActiveLink, Link, LinkError, Linker, Network, NetworkError};
pub use node::{Node, NodeInfo};
pub use query::{Nonce, Query, QueryParams};
pub use router::{CoreRouter, FuncRouter, Hints, PrefixRouter, PriorityRouter, Route, Router};
pub use stream::Duplex;
