//! PLUME Test Utilities
//!
//! Shared test infrastructure for the PLUME workspace:
//! - Scripted network calls whose resolution order the test controls
//! - An in-memory query fetcher
//! - Proptest generators for entities and backend failures
//! - Fixtures and cache assertions

pub use plume_cache::{CacheValue, QueryCache, QueryFetcher, QueryIdentity};
pub use plume_core::{
    BackendError, BackendResult, Comment, CommentId, FailureReason, Post, PostId, PostStatus,
    Profile, ProfileId, RecordId, Tag, TagId, Timestamp,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once, PoisonError};
use tokio::sync::oneshot;

// ============================================================================
// SCRIPTED NETWORK CALLS
// ============================================================================

/// Resolver for a network call created by [`scripted_call`].
///
/// Dropping it without resolving makes the call fail with a network error.
#[derive(Debug)]
pub struct ScriptedCall<T> {
    tx: oneshot::Sender<BackendResult<T>>,
}

impl<T> ScriptedCall<T> {
    pub fn succeed(self, value: T) {
        let _ = self.tx.send(Ok(value));
    }

    pub fn fail(self, error: BackendError) {
        let _ = self.tx.send(Err(error));
    }

    pub fn fail_with(self, reason: FailureReason, message: &str) {
        self.fail(BackendError::new(reason, message));
    }
}

/// A network call future plus the handle that decides how it resolves.
pub fn scripted_call<T: Send + 'static>(
) -> (ScriptedCall<T>, impl Future<Output = BackendResult<T>> + Send + 'static) {
    let (tx, rx) = oneshot::channel();
    let call = async move {
        rx.await
            .unwrap_or_else(|_| Err(BackendError::network("scripted call dropped")))
    };
    (ScriptedCall { tx }, call)
}

// ============================================================================
// IN-MEMORY FETCHER
// ============================================================================

/// [`QueryFetcher`] answering from a map, counting every call.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    values: Mutex<HashMap<QueryIdentity, CacheValue>>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, identity: QueryIdentity, value: CacheValue) -> Self {
        self.set(identity, value);
        self
    }

    pub fn set(&self, identity: QueryIdentity, value: CacheValue) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity, value);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryFetcher for StaticFetcher {
    async fn fetch(&self, identity: &QueryIdentity) -> BackendResult<CacheValue> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
            .ok_or_else(|| BackendError::network(format!("nothing scripted for {identity}")))
    }
}

// ============================================================================
// TRACING
// ============================================================================

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per process, filtered by `RUST_LOG`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for PLUME entities and backend outcomes.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_post_id() -> impl Strategy<Value = PostId> {
        "[a-z0-9]{1,12}".prop_map(PostId::new)
    }

    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 2020-2030
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    pub fn arb_post_status() -> impl Strategy<Value = PostStatus> {
        prop_oneof![
            Just(PostStatus::Draft),
            Just(PostStatus::Published),
            Just(PostStatus::Archived),
        ]
    }

    /// A post whose viewer flags and counts are consistent (a liked post has
    /// at least one like).
    pub fn arb_post() -> impl Strategy<Value = Post> {
        (
            arb_post_id(),
            arb_post_status(),
            any::<bool>(),
            0u64..10_000,
            any::<bool>(),
            0u64..10_000,
            arb_timestamp(),
        )
            .prop_map(|(id, status, is_liked, likes, is_saved, saves, created_at)| {
                let mut post = fixtures::post(id.as_str());
                post.status = status;
                post.is_liked = is_liked;
                post.likes_count = likes + u64::from(is_liked);
                post.is_saved = is_saved;
                post.saves_count = saves + u64::from(is_saved);
                post.created_at = created_at;
                post.updated_at = created_at;
                post
            })
    }

    /// Between `min` and `max` posts with distinct ids.
    pub fn arb_posts(min: usize, max: usize) -> impl Strategy<Value = Vec<Post>> {
        prop::collection::vec(arb_post(), min..=max).prop_map(|posts| {
            posts
                .into_iter()
                .enumerate()
                .map(|(index, mut post)| {
                    post.id = PostId::new(format!("{}-{index}", post.id));
                    post
                })
                .collect()
        })
    }

    pub fn arb_failure_reason() -> impl Strategy<Value = FailureReason> {
        prop_oneof![
            Just(FailureReason::Network),
            Just(FailureReason::Unauthorized),
            Just(FailureReason::Validation),
            Just(FailureReason::Conflict),
        ]
    }

    pub fn arb_backend_error() -> impl Strategy<Value = BackendError> {
        (arb_failure_reason(), "[a-z ]{0,24}")
            .prop_map(|(reason, message)| BackendError::new(reason, message))
    }

    pub fn arb_comment_content() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z ,.!?]{0,79}"
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built entities and identities for common scenarios.

    use super::*;
    use chrono::Utc;

    pub fn viewer() -> ProfileId {
        ProfileId::new("viewer")
    }

    /// A published post with no likes, saves or comments.
    pub fn post(id: &str) -> Post {
        let now = Utc::now();
        Post {
            id: PostId::new(id),
            author_id: ProfileId::new("author"),
            title: format!("Post {id}"),
            slug: format!("post-{id}"),
            content: format!("Body of {id}"),
            status: PostStatus::Published,
            likes_count: 0,
            comments_count: 0,
            saves_count: 0,
            is_liked: false,
            is_saved: false,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn liked_post(id: &str, liked: bool, likes: u64) -> Post {
        let mut post = post(id);
        post.is_liked = liked;
        post.likes_count = likes;
        post
    }

    /// A confirmed comment by `author` with server id `id`.
    pub fn comment(id: &str, post_id: &str, author: &str, content: &str) -> Comment {
        let now = Utc::now();
        Comment {
            id: RecordId::server(id),
            post_id: PostId::new(post_id),
            parent_id: None,
            author_id: ProfileId::new(author),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
            optimistic: false,
        }
    }

    pub fn profile(username: &str) -> Profile {
        Profile {
            id: ProfileId::new(format!("profile-{username}")),
            username: username.to_string(),
            bio: None,
            website: None,
            avatar_url: None,
            links: Vec::new(),
            followers_count: 0,
            following_count: 0,
            is_following: false,
        }
    }

    pub fn tag(name: &str) -> Tag {
        Tag {
            id: TagId::new(name),
            name: name.to_string(),
        }
    }
}

// ============================================================================
// CACHE ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over cache entries.

    use super::*;

    /// Assert the current value of `identity`.
    #[track_caller]
    pub fn assert_value(cache: &QueryCache, identity: &QueryIdentity, expected: &CacheValue) {
        let entry = cache
            .read(identity)
            .unwrap_or_else(|| panic!("Expected an entry for {identity}, got a miss"));
        assert_eq!(entry.value.as_ref(), Some(expected), "value of {identity}");
    }

    /// Assert that `identity` holds a single post and return it.
    #[track_caller]
    pub fn expect_post(cache: &QueryCache, identity: &QueryIdentity) -> Post {
        match cache.read(identity).and_then(|entry| entry.value) {
            Some(CacheValue::Post(post)) => post,
            other => panic!("Expected a post at {identity}, got: {other:?}"),
        }
    }

    /// Assert that `identity` holds a comment list and return its ids as strings.
    #[track_caller]
    pub fn comment_ids(cache: &QueryCache, identity: &QueryIdentity) -> Vec<String> {
        match cache.read(identity).and_then(|entry| entry.value) {
            Some(CacheValue::Comments(comments)) => {
                comments.iter().map(|c| c.id.to_string()).collect()
            }
            other => panic!("Expected comments at {identity}, got: {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_stale(cache: &QueryCache, identity: &QueryIdentity) {
        let entry = cache
            .read(identity)
            .unwrap_or_else(|| panic!("Expected an entry for {identity}, got a miss"));
        assert!(entry.is_stale, "Expected {identity} to be stale");
    }
}
