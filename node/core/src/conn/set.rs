//! Registry of in-flight connections keyed by nonce

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::connection::MonitoredConn;
use crate::error::RegistryError;
use crate::query::Nonce;

/// Snapshot of registry counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnStats {
    /// Connections currently registered
    pub active: usize,
    /// Connections ever registered
    pub added: u64,
    /// Connections ever removed
    pub removed: u64,
}

#[derive(Default)]
struct ConnSetInner {
    conns: DashMap<Nonce, Arc<MonitoredConn>>,
    added: AtomicU64,
    removed: AtomicU64,
}

/// Concurrent map from nonce to connection
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct ConnSet {
    inner: Arc<ConnSetInner>,
}

impl ConnSet {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its nonce
    pub fn add(&self, conn: Arc<MonitoredConn>) -> Result<(), RegistryError> {
        match self.inner.conns.entry(conn.nonce()) {
            Entry::Occupied(_) => Err(RegistryError::Duplicate(conn.nonce().to_string())),
            Entry::Vacant(slot) => {
                conn.set_registry(self.clone());
                slot.insert(conn);
                self.inner.added.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    /// Remove exactly this connection; returns whether it was registered
    ///
    /// A different connection registered under the same nonce is left alone.
    pub fn remove(&self, conn: &MonitoredConn) -> bool {
        let removed = self
            .inner
            .conns
            .remove_if(&conn.nonce(), |_, c| c.id() == conn.id())
            .is_some();
        if removed {
            self.inner.removed.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Connection registered under `nonce`
    #[must_use]
    pub fn find_by_nonce(&self, nonce: Nonce) -> Option<Arc<MonitoredConn>> {
        self.inner.conns.get(&nonce).map(|entry| entry.value().clone())
    }

    /// All registered connections, oldest first
    #[must_use]
    pub fn all(&self) -> Vec<Arc<MonitoredConn>> {
        let mut conns: Vec<_> = self
            .inner
            .conns
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        conns.sort_by_key(|c| c.id());
        conns
    }

    /// Number of registered connections
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.conns.len()
    }

    /// Whether no connection is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.conns.is_empty()
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> ConnStats {
        ConnStats {
            active: self.len(),
            added: self.inner.added.load(Ordering::Relaxed),
            removed: self.inner.removed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ConnSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnSet").field("stats", &self.stats()).finish()
    }
}
