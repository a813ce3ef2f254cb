//! Settlement of a finished mutation against the cache.
//!
//! Success confirms the reconcile function's view of every target and pushes
//! the server's copy of the item into other lists. Failure of any kind puts
//! back each target's own snapshot and each propagated item's own pre-copy.
//! Either way every target, plus the related patterns, is invalidated last.

use plume_core::{MutationError, MutationId};
use tracing::{debug, warn};

use super::pending::{MutationStatus, PropagatedItem};
use super::{ItemPropagation, MutationKind, ReconcileFn, ReconcileInput};
use crate::cache::QueryCache;
use crate::feed::FeedAccumulator;
use crate::query::{IdentityPattern, QueryIdentity};
use crate::value::CacheValue;

/// Everything a spawned mutation task needs to settle.
pub(crate) struct Settlement<T> {
    pub(crate) id: MutationId,
    pub(crate) kind: MutationKind,
    pub(crate) targets: Vec<QueryIdentity>,
    pub(crate) snapshots: Vec<Option<CacheValue>>,
    pub(crate) reconcile: ReconcileFn<T>,
    pub(crate) propagation: Option<ItemPropagation<T>>,
    pub(crate) propagated: Vec<PropagatedItem>,
    pub(crate) also_invalidate: Vec<IdentityPattern>,
}

impl<T> Settlement<T> {
    /// Apply `outcome` to the cache and report the terminal status.
    pub(crate) fn apply(
        &self,
        cache: &QueryCache,
        feeds: &FeedAccumulator,
        outcome: &Result<T, MutationError>,
    ) -> MutationStatus {
        for target in &self.targets {
            cache.end_mutation(target);
        }

        let status = match outcome {
            Ok(value) => {
                self.confirm(cache, feeds, value);
                debug!(mutation_id = %self.id, kind = %self.kind, "mutation succeeded");
                MutationStatus::Succeeded
            }
            Err(err) => {
                self.roll_back(cache, feeds);
                warn!(
                    mutation_id = %self.id,
                    kind = %self.kind,
                    error = %err,
                    "mutation failed, rolled back"
                );
                MutationStatus::Failed
            }
        };

        for target in &self.targets {
            cache.invalidate(target);
        }
        for pattern in &self.also_invalidate {
            cache.invalidate_matching(pattern);
        }
        status
    }

    fn confirm(&self, cache: &QueryCache, feeds: &FeedAccumulator, value: &T) {
        for (target, snapshot) in self.targets.iter().zip(&self.snapshots) {
            let current = cache.peek(target);
            let input = ReconcileInput {
                identity: target,
                current: current.as_ref(),
                snapshot: snapshot.as_ref(),
            };
            if let Some(confirmed) = (self.reconcile)(value, input) {
                cache.put(target, Some(confirmed), true);
            }
        }

        if let Some(propagation) = &self.propagation {
            for identity in cache.identities_containing_post(&propagation.post_id) {
                if self.targets.contains(&identity) {
                    continue;
                }
                feeds.patch_item(&identity, &propagation.post_id, |post| {
                    (propagation.confirmed)(value, post)
                });
            }
        }
    }

    fn roll_back(&self, cache: &QueryCache, feeds: &FeedAccumulator) {
        for (target, snapshot) in self.targets.iter().zip(&self.snapshots) {
            match snapshot {
                Some(value) => cache.put(target, Some(value.clone()), true),
                None => cache.put(target, None, false),
            }
        }

        if let Some(propagation) = &self.propagation {
            for item in &self.propagated {
                feeds.patch_item(&item.identity, &propagation.post_id, |post| {
                    *post = item.before.clone()
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use plume_core::{Post, PostId, PostStatus, ProfileId};
    use std::sync::Arc;

    fn post(liked: bool, likes: u64) -> Post {
        let now = Utc::now();
        Post {
            id: PostId::new("p1"),
            author_id: ProfileId::new("author"),
            title: "Post".to_string(),
            slug: "post".to_string(),
            content: String::new(),
            status: PostStatus::Published,
            likes_count: likes,
            comments_count: 0,
            saves_count: 0,
            is_liked: liked,
            is_saved: false,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn set_likes(likes: &u64, input: ReconcileInput<'_>) -> Option<CacheValue> {
        let mut value = input.current?.clone();
        value.patch_posts(&PostId::new("p1"), |p| p.likes_count = *likes);
        Some(value)
    }

    fn settlement(snapshot: Option<CacheValue>) -> Settlement<u64> {
        Settlement {
            id: MutationId::new(),
            kind: MutationKind::Custom,
            targets: vec![QueryIdentity::post_detail(&PostId::new("p1"))],
            snapshots: vec![snapshot],
            reconcile: Arc::new(set_likes),
            propagation: None,
            propagated: Vec::new(),
            also_invalidate: vec![IdentityPattern::kind(crate::query::QueryKind::PostList)],
        }
    }

    #[test]
    fn test_success_confirms_then_invalidates() {
        let cache = QueryCache::with_defaults();
        let feeds = FeedAccumulator::new(cache.clone());
        let target = QueryIdentity::post_detail(&PostId::new("p1"));
        let original = CacheValue::Post(post(false, 3));
        cache.write(&target, original.clone(), true);
        cache.begin_mutation(&target, Some(CacheValue::Post(post(true, 4))));
        cache.write(&QueryIdentity::post_list(), CacheValue::Posts(Vec::new()), true);

        let status = settlement(Some(original)).apply(&cache, &feeds, &Ok(10));
        assert_eq!(status, MutationStatus::Succeeded);

        let entry = cache.read(&target).unwrap();
        let confirmed = entry.value.as_ref().unwrap().as_post().unwrap();
        assert!(confirmed.is_liked);
        assert_eq!(confirmed.likes_count, 10);
        assert!(entry.is_stale);
        assert_eq!(entry.inflight_mutation_count, 0);
        assert!(cache.read(&QueryIdentity::post_list()).unwrap().is_stale);
    }

    #[test]
    fn test_failure_restores_snapshot() {
        let cache = QueryCache::with_defaults();
        let feeds = FeedAccumulator::new(cache.clone());
        let target = QueryIdentity::post_detail(&PostId::new("p1"));
        let original = CacheValue::Post(post(false, 3));
        cache.write(&target, original.clone(), true);
        cache.begin_mutation(&target, Some(CacheValue::Post(post(true, 4))));

        let status = settlement(Some(original.clone())).apply(
            &cache,
            &feeds,
            &Err(MutationError::Network {
                message: "offline".to_string(),
            }),
        );
        assert_eq!(status, MutationStatus::Failed);
        assert_eq!(cache.value(&target), Some(original));
    }

    #[test]
    fn test_failure_on_former_miss_clears_value() {
        let cache = QueryCache::with_defaults();
        let feeds = FeedAccumulator::new(cache.clone());
        let target = QueryIdentity::post_detail(&PostId::new("p1"));
        cache.begin_mutation(&target, Some(CacheValue::Post(post(true, 1))));

        settlement(None).apply(&cache, &feeds, &Err(MutationError::Cancelled));
        let entry = cache.read(&target).unwrap();
        assert!(entry.value.is_none());
        assert!(!entry.is_confirmed());
    }
}
