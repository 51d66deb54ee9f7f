//! Local service dispatch by name
//!
//! ```text
//!   add_route("echo", a)        exact: only "echo"
//!   add_route("storage.*", b)   prefix: anything starting with "storage."
//!
//!   "storage.read?id=1"  -> strip params -> exact? no -> longest prefix -> b
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{FuncRouter, Hints, Router};
use crate::context::RouteContext;
use crate::error::{RegistryError, RouteError};
use crate::query::{split_query, Query};
use crate::stream::Duplex;

const PREFIX_MARKER: char = '*';

#[derive(Default)]
struct Tables {
    exact: HashMap<String, Arc<dyn Router>>,
    prefix: HashMap<String, Arc<dyn Router>>,
}

/// Dispatches on the query string: exact names first, then longest prefix
pub struct PrefixRouter {
    exclusive: bool,
    enable_params: bool,
    tables: RwLock<Tables>,
}

impl PrefixRouter {
    /// Empty table
    ///
    /// An exclusive table rejects unmatched queries; otherwise they fail with
    /// `RouteNotFound` so that lower-priority routes get a chance.
    #[must_use]
    pub fn new(exclusive: bool) -> Self {
        Self {
            exclusive,
            enable_params: false,
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Ignore `?params` when matching
    #[must_use]
    pub fn with_params(mut self, enabled: bool) -> Self {
        self.enable_params = enabled;
        self
    }

    /// Whether unmatched queries are rejected
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Register `name`, or every name starting with `prefix` for `prefix*`
    pub fn add_route(&self, name: &str, router: Arc<dyn Router>) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::InvalidName);
        }
        let mut tables = self.tables.write();
        let (table, key) = match name.strip_suffix(PREFIX_MARKER) {
            Some(prefix) => (&mut tables.prefix, prefix),
            None => (&mut tables.exact, name),
        };
        if table.contains_key(key) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        table.insert(key.to_string(), router);
        Ok(())
    }

    /// Register an async closure under `name`
    pub fn add_route_fn<F, Fut>(&self, name: &str, func: F) -> Result<(), RegistryError>
    where
        F: Fn(RouteContext, Query, Arc<dyn Duplex>, Hints) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Duplex>, RouteError>> + Send + 'static,
    {
        self.add_route(name, Arc::new(FuncRouter::new(func).with_name(name)))
    }

    /// Remove the entry registered under exactly `name`
    pub fn remove_route(&self, name: &str) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::InvalidName);
        }
        let mut tables = self.tables.write();
        let removed = match name.strip_suffix(PREFIX_MARKER) {
            Some(prefix) => tables.prefix.remove(prefix),
            None => tables.exact.remove(name),
        };
        removed
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Registered names, prefixes rendered with their trailing `*`, sorted
    #[must_use]
    pub fn routes(&self) -> Vec<String> {
        let tables = self.tables.read();
        let mut names: Vec<String> = tables
            .exact
            .keys()
            .cloned()
            .chain(tables.prefix.keys().map(|p| format!("{p}{PREFIX_MARKER}")))
            .collect();
        names.sort();
        names
    }

    /// Best handler for a service path
    #[must_use]
    pub fn match_route(&self, path: &str) -> Option<Arc<dyn Router>> {
        let tables = self.tables.read();
        if let Some(router) = tables.exact.get(path) {
            return Some(router.clone());
        }
        tables
            .prefix
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, router)| router.clone())
    }
}

#[async_trait]
impl Router for PrefixRouter {
    async fn route_query(
        &self,
        ctx: &RouteContext,
        query: &Query,
        caller: Arc<dyn Duplex>,
        hints: &Hints,
    ) -> Result<Arc<dyn Duplex>, RouteError> {
        let path = if self.enable_params {
            split_query(query.query()).0
        } else {
            query.query()
        };

        match self.match_route(path) {
            Some(router) => router.route_query(ctx, query, caller, hints).await,
            None if self.exclusive => Err(RouteError::Rejected),
            None => Err(RouteError::not_found(self.name(), Vec::new())),
        }
    }
}

impl std::fmt::Debug for PrefixRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixRouter")
            .field("exclusive", &self.exclusive)
            .field("enable_params", &self.enable_params)
            .field("routes", &self.routes())
            .finish()
    }
}
