//! The normalized query cache.
//!
//! [`QueryCache`] is the only mutable shared state in the subsystem. Every read
//! and write goes through `read` / `write` / `invalidate` / `subscribe` (plus
//! the crate-internal hooks the executor uses to register in-flight writers).
//!
//! Changes are applied completely under a short internal lock; subscribers are
//! called afterwards, synchronously and in registration order, so a callback
//! may read or write the cache again without deadlocking.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use plume_core::{PostId, RecordId, Timestamp};
use tracing::{debug, trace, warn};

use super::entry::{CacheEntry, CacheStats};
use super::fetcher::QueryFetcher;
use super::freshness::{CacheRead, Freshness};
use super::subscription::{CacheEvent, CacheEventKind, SubscriberRegistry, Subscription};
use crate::config::CacheConfig;
use crate::error::{PlumeError, PlumeResult};
use crate::query::{IdentityPattern, QueryIdentity};
use crate::value::CacheValue;

/// Cloneable handle to one cache instance.
///
/// Create it once at application start and pass clones to every component that
/// needs cache access.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    state: Mutex<CacheState>,
    subscribers: Arc<Mutex<SubscriberRegistry>>,
    fetcher: Option<Arc<dyn QueryFetcher>>,
    config: CacheConfig,
    provisional_seq: AtomicU64,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<QueryIdentity, Slot>,
    stats: CacheStats,
    /// Monotonic counter stamped on a slot every time its value or staleness changes.
    clock: u64,
}

struct Slot {
    entry: CacheEntry,
    epoch: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn slot_mut(&mut self, identity: &QueryIdentity) -> &mut Slot {
        self.slots.entry(identity.clone()).or_insert_with(|| Slot {
            entry: CacheEntry::empty(),
            epoch: 0,
        })
    }

    fn epoch_of(&self, identity: &QueryIdentity) -> Option<u64> {
        self.slots.get(identity).map(|slot| slot.epoch)
    }
}

impl QueryCache {
    /// Create a cache without a backend fetcher; invalidation only marks entries stale.
    pub fn new(config: CacheConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a cache that refetches through `fetcher`.
    pub fn with_fetcher(config: CacheConfig, fetcher: Arc<dyn QueryFetcher>) -> Self {
        Self::build(config, Some(fetcher))
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    fn build(config: CacheConfig, fetcher: Option<Arc<dyn QueryFetcher>>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState::default()),
                subscribers: Arc::new(Mutex::new(SubscriberRegistry::default())),
                fetcher,
                config,
                provisional_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry(&self) -> MutexGuard<'_, SubscriberRegistry> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // READ / WRITE / INVALIDATE / SUBSCRIBE
    // ========================================================================

    /// Deep copy of the entry for `identity`, or `None` on a miss. Never fails.
    pub fn read(&self, identity: &QueryIdentity) -> Option<CacheEntry> {
        let mut state = self.state();
        let entry = state.slots.get(identity).map(|slot| slot.entry.clone());
        if entry.is_some() {
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
        entry
    }

    /// Current value of `identity`, if any.
    pub fn value(&self, identity: &QueryIdentity) -> Option<CacheValue> {
        self.read(identity).and_then(|entry| entry.value)
    }

    /// Replace the value of `identity`, creating the entry if needed.
    ///
    /// A confirmed write stamps `last_confirmed_at` and clears staleness; an
    /// optimistic write leaves the confirmation metadata untouched.
    pub fn write(&self, identity: &QueryIdentity, value: CacheValue, confirmed: bool) {
        self.put(identity, Some(value), confirmed);
    }

    /// Mark `identity` stale without dropping its value.
    ///
    /// When the identity has subscribers and a fetcher is configured, a
    /// background refetch is scheduled.
    pub fn invalidate(&self, identity: &QueryIdentity) {
        let epoch = {
            let mut state = self.state();
            let epoch = state.tick();
            let slot = state.slot_mut(identity);
            slot.entry.is_stale = true;
            slot.epoch = epoch;
            state.stats.invalidations += 1;
            epoch
        };
        trace!(identity = %identity, "cache invalidate");
        self.emit(identity, CacheEventKind::Invalidated);
        self.maybe_refetch(identity, epoch);
    }

    /// Invalidate every cached identity matching `pattern`. Returns how many.
    pub fn invalidate_matching(&self, pattern: &IdentityPattern) -> usize {
        let identities = self.identities_matching(pattern);
        for identity in &identities {
            self.invalidate(identity);
        }
        identities.len()
    }

    /// Register `callback` for changes to `identity`.
    pub fn subscribe<F>(&self, identity: &QueryIdentity, callback: F) -> Subscription
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let id = self.registry().add(identity.clone(), Arc::new(callback));
        Subscription::new(identity.clone(), id, &self.inner.subscribers)
    }

    pub fn subscriber_count(&self, identity: &QueryIdentity) -> usize {
        self.registry().count(identity)
    }

    fn emit(&self, identity: &QueryIdentity, kind: CacheEventKind) {
        let listeners = self.registry().listeners(identity);
        if listeners.is_empty() {
            return;
        }
        let entry = self
            .state()
            .slots
            .get(identity)
            .map(|slot| slot.entry.clone());
        let event = CacheEvent {
            identity: identity.clone(),
            kind,
            entry,
        };
        for listener in listeners {
            listener(&event);
        }
    }

    // ========================================================================
    // ENUMERATION / EVICTION
    // ========================================================================

    /// Cached identities matching `pattern`, in sorted order.
    pub fn identities_matching(&self, pattern: &IdentityPattern) -> Vec<QueryIdentity> {
        let mut identities: Vec<_> = self
            .state()
            .slots
            .keys()
            .filter(|identity| pattern.matches(identity))
            .cloned()
            .collect();
        identities.sort();
        identities
    }

    /// Cached identities whose value contains the post, in sorted order.
    pub fn identities_containing_post(&self, post_id: &PostId) -> Vec<QueryIdentity> {
        let mut identities: Vec<_> = self
            .state()
            .slots
            .iter()
            .filter(|(_, slot)| {
                slot.entry
                    .value
                    .as_ref()
                    .is_some_and(|value| value.contains_post(post_id))
            })
            .map(|(identity, _)| identity.clone())
            .collect();
        identities.sort();
        identities
    }

    /// Remove the entry for `identity`, returning it.
    pub fn evict(&self, identity: &QueryIdentity) -> Option<CacheEntry> {
        let removed = {
            let mut state = self.state();
            let removed = state.slots.remove(identity).map(|slot| slot.entry);
            if removed.is_some() {
                state.stats.evictions += 1;
            }
            removed
        };
        if removed.is_some() {
            self.emit(identity, CacheEventKind::Evicted);
        }
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let identities: Vec<_> = {
            let mut state = self.state();
            let identities: Vec<_> = state.slots.drain().map(|(identity, _)| identity).collect();
            state.stats.evictions += identities.len() as u64;
            identities
        };
        debug!(count = identities.len(), "cache cleared");
        for identity in &identities {
            self.emit(identity, CacheEventKind::Evicted);
        }
    }

    /// Evict unwatched entries whose last confirmation is older than `max_age`.
    ///
    /// Entries with subscribers or in-flight mutations are never swept; neither
    /// are entries that have never been confirmed but hold an optimistic value.
    pub fn sweep_expired(&self, max_age: Duration) -> usize {
        let watched: HashSet<QueryIdentity> = self
            .identities_matching_all()
            .into_iter()
            .filter(|identity| self.subscriber_count(identity) > 0)
            .collect();

        let mut state = self.state();
        let expired: Vec<_> = state
            .slots
            .iter()
            .filter(|(identity, slot)| {
                !watched.contains(*identity)
                    && !slot.entry.has_inflight_mutations()
                    && match slot.entry.age() {
                        Some(age) => age > max_age,
                        None => slot.entry.value.is_none(),
                    }
            })
            .map(|(identity, _)| identity.clone())
            .collect();
        for identity in &expired {
            state.slots.remove(identity);
        }
        state.stats.evictions += expired.len() as u64;
        if !expired.is_empty() {
            debug!(count = expired.len(), "swept expired cache entries");
        }
        expired.len()
    }

    /// Sweep with the configured retention age.
    pub fn sweep_expired_default(&self) -> usize {
        self.sweep_expired(self.inner.config.retention())
    }

    fn identities_matching_all(&self) -> Vec<QueryIdentity> {
        self.state().slots.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        let mut stats = state.stats.clone();
        stats.entry_count = state.slots.len() as u64;
        stats
    }

    /// Allocate a client-side identifier for a record the server has not seen yet.
    pub fn next_provisional_id(&self) -> RecordId {
        let seq = self.inner.provisional_seq.fetch_add(1, Ordering::Relaxed) + 1;
        RecordId::provisional(seq)
    }

    // ========================================================================
    // READ-THROUGH FETCH
    // ========================================================================

    /// Best-effort contract with the configured default staleness tolerance.
    pub fn default_freshness(&self) -> Freshness {
        Freshness::best_effort(self.inner.config.default_max_staleness())
    }

    /// Answer `identity` from the cache if the entry satisfies `freshness`,
    /// otherwise fetch it from the backend and confirm it into the cache.
    pub async fn fetch(
        &self,
        identity: &QueryIdentity,
        freshness: Freshness,
    ) -> PlumeResult<CacheRead<CacheValue>> {
        if let Some(entry) = self.read(identity) {
            if entry.satisfies(&freshness) {
                if let (Some(value), Some(confirmed_at)) = (entry.value, entry.last_confirmed_at) {
                    return Ok(CacheRead::from_cache(value, confirmed_at, entry.is_stale));
                }
            }
        }

        let fetcher = self
            .inner
            .fetcher
            .as_ref()
            .ok_or_else(|| PlumeError::NoFetcher {
                identity: identity.to_string(),
            })?;
        let epoch = self.state().epoch_of(identity);
        let value = fetcher.fetch(identity).await?;
        if !self.apply_fetched(identity, epoch, value.clone()) {
            debug!(identity = %identity, "fetched value not cached, entry changed meanwhile");
        }
        Ok(CacheRead::from_backend(value))
    }

    fn maybe_refetch(&self, identity: &QueryIdentity, epoch: u64) {
        let Some(fetcher) = self.inner.fetcher.as_ref() else {
            return;
        };
        if !self.inner.config.refetch_on_invalidate || self.subscriber_count(identity) == 0 {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(identity = %identity, "no async runtime, skipping refetch");
            return;
        };

        debug!(identity = %identity, "scheduling refetch");
        let cache = self.clone();
        let fetcher = Arc::clone(fetcher);
        let identity = identity.clone();
        runtime.spawn(async move {
            match fetcher.fetch(&identity).await {
                Ok(value) => {
                    if !cache.apply_fetched(&identity, Some(epoch), value) {
                        debug!(identity = %identity, "discarding superseded refetch");
                    }
                }
                Err(err) => {
                    warn!(identity = %identity, error = %err, "refetch failed");
                }
            }
        });
    }

    /// Confirm a fetched value unless the entry changed since the fetch began
    /// or an optimistic writer is in flight.
    fn apply_fetched(
        &self,
        identity: &QueryIdentity,
        expected_epoch: Option<u64>,
        value: CacheValue,
    ) -> bool {
        {
            let mut state = self.state();
            if state.epoch_of(identity) != expected_epoch {
                return false;
            }
            if state
                .slots
                .get(identity)
                .is_some_and(|slot| slot.entry.has_inflight_mutations())
            {
                return false;
            }
            Self::store(&mut state, identity, Some(value), true);
        }
        self.emit(identity, CacheEventKind::Written { confirmed: true });
        true
    }

    // ========================================================================
    // CRATE-INTERNAL HOOKS
    // ========================================================================

    fn store(
        state: &mut CacheState,
        identity: &QueryIdentity,
        value: Option<CacheValue>,
        confirmed: bool,
    ) {
        let epoch = state.tick();
        let slot = state.slot_mut(identity);
        slot.entry.value = value;
        slot.epoch = epoch;
        if confirmed {
            slot.entry.last_confirmed_at = Some(Utc::now());
            slot.entry.is_stale = false;
            state.stats.confirmed_writes += 1;
        } else {
            state.stats.optimistic_writes += 1;
        }
    }

    /// Current value without touching hit/miss statistics.
    pub(crate) fn peek(&self, identity: &QueryIdentity) -> Option<CacheValue> {
        self.state()
            .slots
            .get(identity)
            .and_then(|slot| slot.entry.value.clone())
    }

    /// Write an optional value; `None` restores a pre-mutation miss.
    pub(crate) fn put(&self, identity: &QueryIdentity, value: Option<CacheValue>, confirmed: bool) {
        Self::store(&mut self.state(), identity, value, confirmed);
        trace!(identity = %identity, confirmed, "cache write");
        self.emit(identity, CacheEventKind::Written { confirmed });
    }

    /// Register an optimistic writer on `identity` and apply its value, if any.
    pub(crate) fn begin_mutation(&self, identity: &QueryIdentity, optimistic: Option<CacheValue>) {
        let wrote = {
            let mut state = self.state();
            let wrote = optimistic.is_some();
            if wrote {
                Self::store(&mut state, identity, optimistic, false);
            }
            state.slot_mut(identity).entry.inflight_mutation_count += 1;
            wrote
        };
        if wrote {
            self.emit(identity, CacheEventKind::Written { confirmed: false });
        }
    }

    /// Deregister an optimistic writer from `identity`.
    pub(crate) fn end_mutation(&self, identity: &QueryIdentity) {
        let mut state = self.state();
        if let Some(slot) = state.slots.get_mut(identity) {
            slot.entry.inflight_mutation_count = slot.entry.inflight_mutation_count.saturating_sub(1);
        }
    }

    /// Modify the value of `identity` in place as an unconfirmed write.
    ///
    /// `f` returns whether it changed anything; nothing is written or emitted
    /// otherwise, and nothing happens on a miss.
    pub(crate) fn modify<F>(&self, identity: &QueryIdentity, f: F) -> bool
    where
        F: FnOnce(&mut CacheValue) -> bool,
    {
        let changed = {
            let mut state = self.state();
            let Some(value) = state
                .slots
                .get_mut(identity)
                .and_then(|slot| slot.entry.value.as_mut())
            else {
                return false;
            };
            let changed = f(value);
            if changed {
                let epoch = state.tick();
                if let Some(slot) = state.slots.get_mut(identity) {
                    slot.epoch = epoch;
                }
                state.stats.optimistic_writes += 1;
            }
            changed
        };
        if changed {
            self.emit(identity, CacheEventKind::Written { confirmed: false });
        }
        changed
    }

    /// Insert a rehydrated entry, marked stale. Existing entries win.
    pub(crate) fn hydrate(
        &self,
        identity: QueryIdentity,
        value: CacheValue,
        confirmed_at: Timestamp,
    ) -> bool {
        let mut state = self.state();
        if state.slots.contains_key(&identity) {
            return false;
        }
        let epoch = state.tick();
        state.slots.insert(
            identity,
            Slot {
                entry: CacheEntry {
                    value: Some(value),
                    last_confirmed_at: Some(confirmed_at),
                    is_stale: true,
                    inflight_mutation_count: 0,
                },
                epoch,
            },
        );
        true
    }

    /// Confirmed entries with no optimistic writer in flight.
    pub(crate) fn confirmed_entries(&self) -> Vec<(QueryIdentity, CacheValue, Timestamp)> {
        let state = self.state();
        let mut entries: Vec<_> = state
            .slots
            .iter()
            .filter(|(_, slot)| !slot.entry.has_inflight_mutations())
            .filter_map(|(identity, slot)| {
                let value = slot.entry.value.clone()?;
                let confirmed_at = slot.entry.last_confirmed_at?;
                Some((identity.clone(), value, confirmed_at))
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.len())
            .field("has_fetcher", &self.inner.fetcher.is_some())
            .finish()
    }
}
