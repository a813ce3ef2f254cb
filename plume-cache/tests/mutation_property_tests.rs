//! Property-Based Tests for Optimistic Mutations
//!
//! - Optimism then confirm: a toggle is visible as soon as `execute` returns
//!   and the server's numbers win once it succeeds.
//! - Rollback: any failure restores every affected identity exactly.
//! - Stacking: a second toggle composes on the first one's provisional value.
//! - Comment reconciliation: the server record takes the provisional record's
//!   slot, with no duplicate and no reordering.

use plume_cache::{
    CacheValue, FeedPages, MutationExecutor, MutationHandle, MutationSpec, QueryCache,
    QueryIdentity,
};
use plume_core::{
    BackendError, Comment, FollowReceipt, LikeReceipt, MutationError, NewComment, Post, PostId,
    PostUpdate, Profile, ProfileUpdate, RecordId, SaveReceipt,
};
use plume_test_utils::fixtures::{comment, liked_post, post, profile, viewer};
use plume_test_utils::generators::{arb_backend_error, arb_comment_content, arb_post};
use plume_test_utils::{scripted_call, ScriptedCall};
use proptest::prelude::*;

// ============================================================================
// TEST SUPPORT
// ============================================================================

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

fn detail(post: &Post) -> QueryIdentity {
    QueryIdentity::post_detail(&post.id)
}

/// Post detail, a plain list, a feed, a comment thread and a profile, all confirmed.
fn seeded_cache(subject: &Post) -> QueryCache {
    let cache = QueryCache::with_defaults();
    cache.write(&detail(subject), CacheValue::Post(subject.clone()), true);
    cache.write(
        &QueryIdentity::post_list(),
        CacheValue::Posts(vec![post("other"), subject.clone()]),
        true,
    );
    let mut feed = FeedPages::new();
    feed.push_page(vec![subject.clone(), post("next")], Some("cursor-1".to_string()));
    cache.write(
        &QueryIdentity::post_feed(&viewer()),
        CacheValue::Feed(feed),
        true,
    );
    cache.write(
        &QueryIdentity::comments_for_post(&subject.id),
        CacheValue::Comments(vec![
            comment("c1", subject.id.as_str(), "alice", "first"),
            comment("c2", subject.id.as_str(), "bob", "second"),
        ]),
        true,
    );
    cache.write(
        &QueryIdentity::profile("bob"),
        CacheValue::Profile(profile("bob")),
        true,
    );
    cache
}

fn all_values(cache: &QueryCache, subject: &Post) -> Vec<Option<CacheValue>> {
    [
        detail(subject),
        QueryIdentity::post_list(),
        QueryIdentity::post_feed(&viewer()),
        QueryIdentity::comments_for_post(&subject.id),
        QueryIdentity::profile("bob"),
    ]
    .iter()
    .map(|identity| cache.value(identity))
    .collect()
}

async fn fail_after<T: Send + 'static>(
    handle: MutationHandle<T>,
    call: ScriptedCall<T>,
    error: BackendError,
) -> Result<(), MutationError> {
    call.fail(error);
    handle.settled().await.map(|_| ())
}

/// Execute the `kind`-th mutation against `subject` and make its call fail.
async fn run_failing(
    kind: usize,
    cache: &QueryCache,
    executor: &MutationExecutor,
    subject: &Post,
    error: BackendError,
) -> Result<(), MutationError> {
    let post_id = subject.id.clone();
    match kind {
        0 => {
            let (call, fut) = scripted_call::<LikeReceipt>();
            let handle = executor.execute(MutationSpec::toggle_like(post_id, fut));
            fail_after(handle, call, error).await
        }
        1 => {
            let (call, fut) = scripted_call::<SaveReceipt>();
            let handle = executor.execute(MutationSpec::toggle_save(post_id, fut));
            fail_after(handle, call, error).await
        }
        2 => {
            let (call, fut) = scripted_call::<FollowReceipt>();
            let handle = executor.execute(MutationSpec::toggle_follow("bob", fut));
            fail_after(handle, call, error).await
        }
        3 => {
            let (call, fut) = scripted_call::<Comment>();
            let input = NewComment {
                post_id,
                parent_id: Some(RecordId::server("c1")),
                author_id: viewer(),
                content: "reply".to_string(),
            };
            let handle = executor.execute(MutationSpec::create_comment(cache, input, fut));
            fail_after(handle, call, error).await
        }
        4 => {
            let (call, fut) = scripted_call::<Comment>();
            let spec =
                MutationSpec::update_comment(post_id, RecordId::server("c2"), "edited", fut);
            fail_after(executor.execute(spec), call, error).await
        }
        5 => {
            let (call, fut) = scripted_call::<()>();
            let spec = MutationSpec::delete_comment(post_id, RecordId::server("c1"), fut);
            fail_after(executor.execute(spec), call, error).await
        }
        6 => {
            let (call, fut) = scripted_call::<Profile>();
            let update = ProfileUpdate {
                bio: Some("new bio".to_string()),
                ..Default::default()
            };
            let spec = MutationSpec::update_profile("bob", update, fut);
            fail_after(executor.execute(spec), call, error).await
        }
        _ => {
            let (call, fut) = scripted_call::<Post>();
            let update = PostUpdate {
                title: Some("Retitled".to_string()),
                ..Default::default()
            };
            let spec = MutationSpec::update_post(post_id, update, fut);
            fail_after(executor.execute(spec), call, error).await
        }
    }
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A toggle-like is visible synchronously; the server's count wins after success.
    #[test]
    fn prop_toggle_like_optimism_then_confirm(
        subject in arb_post(),
        server_likes in 0u64..100_000,
    ) {
        let rt = runtime();
        rt.block_on(async {
            let cache = seeded_cache(&subject);
            let executor = MutationExecutor::new(cache.clone());
            let (call, fut) = scripted_call::<LikeReceipt>();

            let handle = executor.execute(MutationSpec::toggle_like(subject.id.clone(), fut));

            let provisional = plume_test_utils::assertions::expect_post(&cache, &detail(&subject));
            prop_assert_eq!(provisional.is_liked, !subject.is_liked);
            let expected = if subject.is_liked {
                subject.likes_count - 1
            } else {
                subject.likes_count + 1
            };
            prop_assert_eq!(provisional.likes_count, expected);

            let receipt = LikeReceipt {
                post_id: subject.id.clone(),
                is_liked: !subject.is_liked,
                likes_count: server_likes,
            };
            call.succeed(receipt.clone());
            prop_assert_eq!(handle.settled().await, Ok(receipt));

            let confirmed = plume_test_utils::assertions::expect_post(&cache, &detail(&subject));
            prop_assert_eq!(confirmed.likes_count, server_likes);
            prop_assert_eq!(confirmed.is_liked, !subject.is_liked);

            let feed = cache.value(&QueryIdentity::post_feed(&viewer())).unwrap();
            let in_feed = feed.find_post(&subject.id).unwrap();
            prop_assert_eq!(in_feed.likes_count, server_likes);
            Ok(())
        })?;
    }

    /// Every mutation kind, failing with every reason, restores every identity.
    #[test]
    fn prop_failure_restores_snapshot(
        subject in arb_post(),
        kind in 0usize..8,
        error in arb_backend_error(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let cache = seeded_cache(&subject);
            let executor = MutationExecutor::new(cache.clone());
            let before = all_values(&cache, &subject);

            let outcome = run_failing(kind, &cache, &executor, &subject, error.clone()).await;
            prop_assert_eq!(outcome, Err(MutationError::from(error)));
            prop_assert_eq!(all_values(&cache, &subject), before);
            prop_assert_eq!(executor.pending_count(), 0);
            Ok(())
        })?;
    }

    /// Two toggles before either settles compose, whichever call resolves first.
    #[test]
    fn prop_stacked_toggles_compose(
        start in 0u64..10_000,
        second_first in any::<bool>(),
        first_ok in any::<bool>(),
        second_ok in any::<bool>(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let subject = liked_post("p1", false, start);
            let cache = seeded_cache(&subject);
            let executor = MutationExecutor::new(cache.clone());

            let (call_a, fut_a) = scripted_call::<LikeReceipt>();
            let (call_b, fut_b) = scripted_call::<LikeReceipt>();
            let a = executor.execute(MutationSpec::toggle_like(subject.id.clone(), fut_a));
            let b = executor.execute(MutationSpec::toggle_like(subject.id.clone(), fut_b));

            let stacked = plume_test_utils::assertions::expect_post(&cache, &detail(&subject));
            prop_assert!(!stacked.is_liked);
            prop_assert_eq!(stacked.likes_count, start);
            prop_assert_eq!(cache.read(&detail(&subject)).unwrap().inflight_mutation_count, 2);

            let resolve = |call: ScriptedCall<LikeReceipt>, ok: bool, liked: bool| {
                if ok {
                    call.succeed(LikeReceipt {
                        post_id: PostId::new("p1"),
                        is_liked: liked,
                        likes_count: start + u64::from(liked),
                    });
                } else {
                    call.fail(BackendError::network("offline"));
                }
            };
            if second_first {
                resolve(call_b, second_ok, false);
                let _ = b.settled().await;
                resolve(call_a, first_ok, true);
                let _ = a.settled().await;
            } else {
                resolve(call_a, first_ok, true);
                let _ = a.settled().await;
                resolve(call_b, second_ok, false);
                let _ = b.settled().await;
            }

            let entry = cache.read(&detail(&subject)).unwrap();
            prop_assert_eq!(entry.inflight_mutation_count, 0);
            prop_assert!(entry.is_stale);
            prop_assert_eq!(executor.pending_count(), 0);
            Ok(())
        })?;
    }

    /// The confirmed comment lands where the provisional one was.
    #[test]
    fn prop_created_comment_reconciles_in_place(
        before in 0usize..6,
        after in 0usize..6,
        content in arb_comment_content(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let subject = post("p1");
            let cache = QueryCache::with_defaults();
            let identity = QueryIdentity::comments_for_post(&subject.id);
            let existing: Vec<Comment> = (0..before)
                .map(|i| comment(&format!("old-{i}"), "p1", "carol", &format!("old {i}")))
                .collect();
            cache.write(&identity, CacheValue::Comments(existing), true);

            let executor = MutationExecutor::new(cache.clone());
            let (call, fut) = scripted_call::<Comment>();
            let input = NewComment {
                post_id: subject.id.clone(),
                parent_id: None,
                author_id: viewer(),
                content: content.clone(),
            };
            let handle = executor.execute(MutationSpec::create_comment(&cache, input, fut));

            // Later comments from other people arrive while the call is in flight.
            let mut grown = cache.value(&identity).unwrap().as_comments().unwrap().to_vec();
            prop_assert!(grown[before].id.is_provisional());
            prop_assert!(grown[before].optimistic);
            grown.extend((0..after).map(|i| {
                comment(&format!("new-{i}"), "p1", "dave", &format!("new {i}"))
            }));
            cache.write(&identity, CacheValue::Comments(grown), false);

            call.succeed(comment("c-server", "p1", "viewer", &content));
            handle.settled().await.unwrap();

            let ids = plume_test_utils::assertions::comment_ids(&cache, &identity);
            prop_assert_eq!(ids.len(), before + 1 + after);
            prop_assert_eq!(ids[before].as_str(), "c-server");
            prop_assert_eq!(ids.iter().filter(|id| id.as_str() == "c-server").count(), 1);
            prop_assert!(ids.iter().all(|id| !id.starts_with("temp-")));
            Ok(())
        })?;
    }
}
