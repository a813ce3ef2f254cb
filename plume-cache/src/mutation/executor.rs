//! Runs mutation specs: optimistic write now, network call on the runtime,
//! settlement when it resolves or is cancelled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use plume_core::{MutationError, MutationId};
use tokio::sync::{broadcast, oneshot, watch, Notify};
use tracing::{debug, info, warn};

use super::pending::{MutationStatus, PendingMutation, PropagatedItem};
use super::reconcile::Settlement;
use super::{MutationKind, MutationSpec};
use crate::cache::QueryCache;
use crate::feed::FeedAccumulator;

/// Out-of-band signal that a mutation failed because the user must sign in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequired {
    pub mutation_id: MutationId,
    pub kind: MutationKind,
    pub message: String,
}

/// Awaitable outcome of one executed mutation.
#[derive(Debug)]
pub struct MutationHandle<T> {
    id: MutationId,
    kind: MutationKind,
    rx: oneshot::Receiver<Result<T, MutationError>>,
}

impl<T> MutationHandle<T> {
    pub fn id(&self) -> MutationId {
        self.id
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Wait for settlement. The cache has been reconciled and invalidated by
    /// the time this resolves.
    pub async fn settled(self) -> Result<T, MutationError> {
        self.rx.await.unwrap_or(Err(MutationError::Cancelled))
    }
}

/// Executes [`MutationSpec`]s against a shared [`QueryCache`].
///
/// Cheap to clone; clones share the pending registry and shutdown signal.
#[derive(Clone)]
pub struct MutationExecutor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    cache: QueryCache,
    feeds: FeedAccumulator,
    pending: Mutex<HashMap<MutationId, PendingMutation>>,
    idle: Notify,
    shutdown: watch::Sender<bool>,
    auth_tx: broadcast::Sender<AuthRequired>,
}

impl ExecutorInner {
    fn pending(&self) -> MutexGuard<'_, HashMap<MutationId, PendingMutation>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish<T>(
        &self,
        settlement: &Settlement<T>,
        outcome: &Result<T, MutationError>,
    ) -> MutationStatus {
        let status = settlement.apply(&self.cache, &self.feeds, outcome);

        if let Err(err) = outcome {
            if err.requires_sign_in() {
                let signal = AuthRequired {
                    mutation_id: settlement.id,
                    kind: settlement.kind,
                    message: err.user_message(),
                };
                if self.auth_tx.send(signal).is_err() {
                    debug!(mutation_id = %settlement.id, "No receivers for auth signal");
                }
            }
        }

        let now_idle = {
            let mut pending = self.pending();
            pending.remove(&settlement.id);
            pending.is_empty()
        };
        debug!(mutation_id = %settlement.id, status = ?status, "mutation settled");
        if now_idle {
            self.idle.notify_waiters();
        }
        status
    }
}

impl MutationExecutor {
    pub fn new(cache: QueryCache) -> Self {
        let capacity = cache.config().auth_signal_capacity.max(1);
        let (auth_tx, _rx) = broadcast::channel(capacity);
        let (shutdown, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(ExecutorInner {
                feeds: FeedAccumulator::new(cache.clone()),
                cache,
                pending: Mutex::new(HashMap::new()),
                idle: Notify::new(),
                shutdown,
                auth_tx,
            }),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    /// Apply the mutation's optimistic patches and start its network call.
    ///
    /// Everything up to the network call happens before this returns, so a
    /// `read` right after `execute` already sees the provisional state. The
    /// call runs on the current tokio runtime; without one the mutation is
    /// settled as cancelled immediately.
    pub fn execute<T: Send + 'static>(&self, spec: MutationSpec<T>) -> MutationHandle<T> {
        let MutationSpec {
            kind,
            network_call,
            targets,
            optimistic,
            reconcile,
            propagation,
            also_invalidate,
        } = spec;
        let id = MutationId::new();
        let cache = &self.inner.cache;

        let mut snapshots = Vec::with_capacity(targets.len());
        let mut provisional = Vec::with_capacity(targets.len());
        for target in &targets {
            let snapshot = cache.peek(target);
            let next = optimistic(target, snapshot.as_ref());
            cache.begin_mutation(target, next.clone());
            snapshots.push(snapshot);
            provisional.push(next);
        }

        let mut propagated = Vec::new();
        if let Some(propagation) = &propagation {
            for identity in cache.identities_containing_post(&propagation.post_id) {
                if targets.contains(&identity) {
                    continue;
                }
                let Some(before) = cache
                    .peek(&identity)
                    .and_then(|value| value.find_post(&propagation.post_id).cloned())
                else {
                    continue;
                };
                self.inner
                    .feeds
                    .patch_item(&identity, &propagation.post_id, |post| {
                        (propagation.optimistic)(post)
                    });
                propagated.push(PropagatedItem { identity, before });
            }
        }

        self.inner.pending().insert(
            id,
            PendingMutation {
                id,
                kind,
                targets: targets.clone(),
                snapshots: snapshots.clone(),
                optimistic: provisional,
                started_at: Utc::now(),
                propagated: propagated.clone(),
            },
        );
        debug!(
            mutation_id = %id,
            kind = %kind,
            targets = targets.len(),
            propagated = propagated.len(),
            "optimistic mutation applied"
        );

        let settlement = Settlement {
            id,
            kind,
            targets,
            snapshots,
            reconcile,
            propagation,
            propagated,
            also_invalidate,
        };
        let (tx, rx) = oneshot::channel();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let inner = Arc::clone(&self.inner);
                let shutdown_rx = inner.shutdown.subscribe();
                runtime.spawn(async move {
                    let outcome = tokio::select! {
                        biased;
                        result = network_call => result.map_err(MutationError::from),
                        _ = shutdown_requested(shutdown_rx) => Err(MutationError::Cancelled),
                    };
                    inner.finish(&settlement, &outcome);
                    // The caller may have dropped the handle.
                    let _ = tx.send(outcome);
                });
            }
            Err(_) => {
                warn!(mutation_id = %id, kind = %kind, "no async runtime, cancelling mutation");
                drop(network_call);
                let outcome = Err(MutationError::Cancelled);
                self.inner.finish(&settlement, &outcome);
                let _ = tx.send(outcome);
            }
        }

        MutationHandle { id, kind, rx }
    }

    /// Cancel every in-flight network call. Cancelled mutations roll back.
    ///
    /// Mutations executed after shutdown are cancelled as soon as they start.
    pub fn shutdown(&self) {
        let in_flight = self.pending_count();
        info!(in_flight, "mutation executor shutting down");
        self.inner.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Resolves once no mutation is pending.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.pending_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending().len()
    }

    /// Snapshot of the pending registry, oldest first.
    pub fn pending(&self) -> Vec<PendingMutation> {
        let mut pending: Vec<_> = self.inner.pending().values().cloned().collect();
        pending.sort_by_key(|mutation| mutation.id.as_uuid());
        pending
    }

    /// Receiver for sign-in-required signals from failed mutations.
    pub fn auth_required(&self) -> broadcast::Receiver<AuthRequired> {
        self.inner.auth_tx.subscribe()
    }
}

async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    // A closed channel means the executor is gone, which cancels too.
    let _ = rx.wait_for(|stopped| *stopped).await;
}

impl std::fmt::Debug for MutationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationExecutor")
            .field("pending", &self.pending_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
