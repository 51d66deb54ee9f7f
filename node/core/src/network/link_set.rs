//! Registry of active links

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::link::{Link, LinkRouter};
use super::NetworkError;
use crate::identity::Identity;
use crate::router::Router;

/// A link that has been added to the network
pub struct ActiveLink {
    id: u64,
    added_at: Instant,
    link: Arc<dyn Link>,
    router: Arc<dyn Router>,
}

impl ActiveLink {
    /// Id unique within its [`LinkSet`]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// When the link was added
    #[must_use]
    pub fn added_at(&self) -> Instant {
        self.added_at
    }

    /// The link itself
    #[must_use]
    pub fn link(&self) -> &Arc<dyn Link> {
        &self.link
    }

    /// Router registered in the route table for this link
    #[must_use]
    pub fn router(&self) -> &Arc<dyn Router> {
        &self.router
    }

    /// Remote identity of the link
    #[must_use]
    pub fn remote_identity(&self) -> Identity {
        self.link.remote_identity()
    }
}

impl std::fmt::Debug for ActiveLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveLink")
            .field("id", &self.id)
            .field("remote", &self.link.remote_identity())
            .field("network", &self.link.network())
            .finish()
    }
}

/// Concurrent set of [`ActiveLink`]s keyed by id
#[derive(Default)]
pub struct LinkSet {
    links: DashMap<u64, Arc<ActiveLink>>,
    // link instance address -> id
    instances: DashMap<usize, u64>,
    next_id: AtomicU64,
}

fn instance_key(link: &Arc<dyn Link>) -> usize {
    Arc::as_ptr(link).cast::<()>() as usize
}

impl LinkSet {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a link; the same link instance can only be added once
    pub fn add(&self, link: Arc<dyn Link>) -> Result<Arc<ActiveLink>, NetworkError> {
        let id = match self.instances.entry(instance_key(&link)) {
            Entry::Occupied(_) => return Err(NetworkError::DuplicateLink),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                slot.insert(id);
                id
            }
        };

        let active = Arc::new(ActiveLink {
            id,
            added_at: Instant::now(),
            router: Arc::new(LinkRouter(link.clone())),
            link,
        });
        self.links.insert(id, active.clone());
        Ok(active)
    }

    /// Remove by id
    pub fn remove(&self, id: u64) -> Result<Arc<ActiveLink>, NetworkError> {
        let (_, active) = self.links.remove(&id).ok_or(NetworkError::LinkNotFound(id))?;
        self.instances.remove_if(&instance_key(&active.link), |_, owner| *owner == id);
        Ok(active)
    }

    /// Look up by id
    #[must_use]
    pub fn find(&self, id: u64) -> Option<Arc<ActiveLink>> {
        self.links.get(&id).map(|entry| entry.value().clone())
    }

    /// Links whose remote end is `remote`
    #[must_use]
    pub fn by_remote(&self, remote: &Identity) -> Vec<Arc<ActiveLink>> {
        let mut links: Vec<_> = self
            .links
            .iter()
            .filter(|entry| entry.link.remote_identity().is_equal(remote))
            .map(|entry| entry.value().clone())
            .collect();
        links.sort_by_key(|l| l.id);
        links
    }

    /// All links, oldest first
    #[must_use]
    pub fn all(&self) -> Vec<Arc<ActiveLink>> {
        let mut links: Vec<_> = self.links.iter().map(|entry| entry.value().clone()).collect();
        links.sort_by_key(|l| l.id);
        links
    }

    /// Number of links
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether there are no links
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
