//! Subscriber registry and unsubscribe handles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::entry::CacheEntry;
use crate::query::QueryIdentity;

/// What happened to a subscribed identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
    Written { confirmed: bool },
    Invalidated,
    Evicted,
}

/// Notification delivered to subscribers after a cache change is fully applied.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    pub identity: QueryIdentity,
    pub kind: CacheEventKind,
    /// The entry as it stands after the change (`None` once evicted).
    pub entry: Option<CacheEntry>,
}

pub type SubscriberFn = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    next_id: u64,
    by_identity: HashMap<QueryIdentity, Vec<(u64, SubscriberFn)>>,
}

impl SubscriberRegistry {
    pub(crate) fn add(&mut self, identity: QueryIdentity, callback: SubscriberFn) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.by_identity
            .entry(identity)
            .or_default()
            .push((id, callback));
        id
    }

    pub(crate) fn remove(&mut self, identity: &QueryIdentity, id: u64) -> bool {
        let Some(subscribers) = self.by_identity.get_mut(identity) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            self.by_identity.remove(identity);
        }
        removed
    }

    /// Callbacks for `identity` in registration order.
    pub(crate) fn listeners(&self, identity: &QueryIdentity) -> Vec<SubscriberFn> {
        self.by_identity
            .get(identity)
            .map(|subscribers| subscribers.iter().map(|(_, f)| Arc::clone(f)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, identity: &QueryIdentity) -> usize {
        self.by_identity.get(identity).map_or(0, Vec::len)
    }
}

/// Handle returned by `QueryCache::subscribe`.
///
/// The callback stays registered until [`Subscription::unsubscribe`] is called
/// or the handle is dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    identity: QueryIdentity,
    id: u64,
    registry: Weak<Mutex<SubscriberRegistry>>,
}

impl Subscription {
    pub(crate) fn new(
        identity: QueryIdentity,
        id: u64,
        registry: &Arc<Mutex<SubscriberRegistry>>,
    ) -> Self {
        Self {
            identity,
            id,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn identity(&self) -> &QueryIdentity {
        &self.identity
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.identity, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("identity", &self.identity)
            .field("id", &self.id)
            .finish()
    }
}
