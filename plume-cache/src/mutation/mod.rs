//! Optimistic mutations.
//!
//! A [`MutationSpec`] describes one state-changing backend call: which cache
//! identities it targets, how each should look while the call is in flight, and
//! how to fold the server's answer back in. The [`MutationExecutor`] runs every
//! one through the same lifecycle:
//!
//! ```text
//! execute ─► optimistic write ─► network call ─┬─► succeeded ─► confirmed write ─┐
//!                                              └─► failed ────► snapshot write ──┴─► invalidate
//! ```
//!
//! Every mutation kind the application needs has a constructor here; custom
//! mutations can be assembled with the builder methods.

mod executor;
mod pending;
mod reconcile;

pub use executor::{AuthRequired, MutationExecutor, MutationHandle};
pub use pending::{MutationStatus, PendingMutation};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::BoxFuture;
use plume_core::{
    BackendResult, Comment, CommentId, FollowReceipt, LikeReceipt, NewComment, NewPost, Post,
    PostId, PostUpdate, Profile, ProfileUpdate, SaveReceipt,
};
use serde::{Deserialize, Serialize};

use crate::cache::QueryCache;
use crate::patch;
use crate::query::{IdentityPattern, QueryIdentity, QueryKind};
use crate::value::CacheValue;

/// The closed set of user actions that mutate server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    ToggleLike,
    ToggleSave,
    ToggleFollow,
    CreateComment,
    UpdateComment,
    DeleteComment,
    UpdateProfile,
    UpdatePost,
    CreatePost,
    DeletePost,
    AddPostTags,
    /// Assembled by hand with [`MutationSpec::new`].
    Custom,
}

impl MutationKind {
    pub fn label(&self) -> &'static str {
        match self {
            MutationKind::ToggleLike => "toggle_like",
            MutationKind::ToggleSave => "toggle_save",
            MutationKind::ToggleFollow => "toggle_follow",
            MutationKind::CreateComment => "create_comment",
            MutationKind::UpdateComment => "update_comment",
            MutationKind::DeleteComment => "delete_comment",
            MutationKind::UpdateProfile => "update_profile",
            MutationKind::UpdatePost => "update_post",
            MutationKind::CreatePost => "create_post",
            MutationKind::DeletePost => "delete_post",
            MutationKind::AddPostTags => "add_post_tags",
            MutationKind::Custom => "custom",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a reconcile function gets to look at for one target.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    pub identity: &'a QueryIdentity,
    /// The value at settlement time, including other mutations' optimistic patches.
    pub current: Option<&'a CacheValue>,
    /// The value when this mutation started.
    pub snapshot: Option<&'a CacheValue>,
}

/// Computes a target's provisional value from its previous one. `None` skips the write.
pub type OptimisticFn =
    Arc<dyn Fn(&QueryIdentity, Option<&CacheValue>) -> Option<CacheValue> + Send + Sync>;

/// Computes a target's confirmed value from the server result. `None` skips the write.
pub type ReconcileFn<T> = Arc<dyn Fn(&T, ReconcileInput<'_>) -> Option<CacheValue> + Send + Sync>;

/// Patches one post inside every other cached list or feed that holds it.
pub struct ItemPropagation<T> {
    pub post_id: PostId,
    pub optimistic: Arc<dyn Fn(&mut Post) + Send + Sync>,
    pub confirmed: Arc<dyn Fn(&T, &mut Post) + Send + Sync>,
}

impl<T> Clone for ItemPropagation<T> {
    fn clone(&self) -> Self {
        Self {
            post_id: self.post_id.clone(),
            optimistic: Arc::clone(&self.optimistic),
            confirmed: Arc::clone(&self.confirmed),
        }
    }
}

/// One backend mutation plus everything needed to show it optimistically.
pub struct MutationSpec<T> {
    pub(crate) kind: MutationKind,
    pub(crate) network_call: BoxFuture<'static, BackendResult<T>>,
    pub(crate) targets: Vec<QueryIdentity>,
    pub(crate) optimistic: OptimisticFn,
    pub(crate) reconcile: ReconcileFn<T>,
    pub(crate) propagation: Option<ItemPropagation<T>>,
    pub(crate) also_invalidate: Vec<IdentityPattern>,
}

impl<T: Send + 'static> MutationSpec<T> {
    /// A mutation with no targets, no optimistic patch, and a reconcile step that
    /// keeps whatever the cache holds at settlement.
    pub fn new<F>(kind: MutationKind, network_call: F) -> Self
    where
        F: Future<Output = BackendResult<T>> + Send + 'static,
    {
        Self {
            kind,
            network_call: Box::pin(network_call),
            targets: Vec::new(),
            optimistic: Arc::new(|_, _| None),
            reconcile: Arc::new(|_, input| input.current.cloned()),
            propagation: None,
            also_invalidate: Vec::new(),
        }
    }

    pub fn target(mut self, identity: QueryIdentity) -> Self {
        if !self.targets.contains(&identity) {
            self.targets.push(identity);
        }
        self
    }

    pub fn optimistic<F>(mut self, f: F) -> Self
    where
        F: Fn(&QueryIdentity, Option<&CacheValue>) -> Option<CacheValue> + Send + Sync + 'static,
    {
        self.optimistic = Arc::new(f);
        self
    }

    pub fn reconcile<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, ReconcileInput<'_>) -> Option<CacheValue> + Send + Sync + 'static,
    {
        self.reconcile = Arc::new(f);
        self
    }

    /// Keep copies of `post_id` in non-target lists and feeds in step.
    pub fn propagate<O, C>(mut self, post_id: PostId, optimistic: O, confirmed: C) -> Self
    where
        O: Fn(&mut Post) + Send + Sync + 'static,
        C: Fn(&T, &mut Post) + Send + Sync + 'static,
    {
        self.propagation = Some(ItemPropagation {
            post_id,
            optimistic: Arc::new(optimistic),
            confirmed: Arc::new(confirmed),
        });
        self
    }

    /// Also invalidate everything matching `pattern` once settled.
    pub fn also_invalidate(mut self, pattern: IdentityPattern) -> Self {
        self.also_invalidate.push(pattern);
        self
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn targets(&self) -> &[QueryIdentity] {
        &self.targets
    }
}

impl<T> fmt::Debug for MutationSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationSpec")
            .field("kind", &self.kind)
            .field("targets", &self.targets)
            .field("propagates", &self.propagation.as_ref().map(|p| &p.post_id))
            .field("also_invalidate", &self.also_invalidate)
            .finish()
    }
}

impl MutationSpec<LikeReceipt> {
    pub fn toggle_like<F>(post_id: PostId, network_call: F) -> Self
    where
        F: Future<Output = BackendResult<LikeReceipt>> + Send + 'static,
    {
        let optimistic_id = post_id.clone();
        Self::new(MutationKind::ToggleLike, network_call)
            .target(QueryIdentity::post_detail(&post_id))
            .optimistic(move |_, previous| patch::toggle_like(previous, &optimistic_id))
            .reconcile(|receipt: &LikeReceipt, input| {
                let mut value = input.current?.clone();
                value.patch_posts(&receipt.post_id, |post| receipt.apply_to(post));
                Some(value)
            })
            .propagate(post_id, patch::flip_like, |receipt: &LikeReceipt, post| {
                receipt.apply_to(post)
            })
    }
}

impl MutationSpec<SaveReceipt> {
    pub fn toggle_save<F>(post_id: PostId, network_call: F) -> Self
    where
        F: Future<Output = BackendResult<SaveReceipt>> + Send + 'static,
    {
        let optimistic_id = post_id.clone();
        Self::new(MutationKind::ToggleSave, network_call)
            .target(QueryIdentity::post_detail(&post_id))
            .optimistic(move |_, previous| patch::toggle_save(previous, &optimistic_id))
            .reconcile(|receipt: &SaveReceipt, input| {
                let mut value = input.current?.clone();
                value.patch_posts(&receipt.post_id, |post| receipt.apply_to(post));
                Some(value)
            })
            .propagate(post_id, patch::flip_save, |receipt: &SaveReceipt, post| {
                receipt.apply_to(post)
            })
            .also_invalidate(IdentityPattern::kind(QueryKind::SavedPostList))
    }
}

impl MutationSpec<FollowReceipt> {
    pub fn toggle_follow<F>(username: impl Into<String>, network_call: F) -> Self
    where
        F: Future<Output = BackendResult<FollowReceipt>> + Send + 'static,
    {
        let username = username.into();
        let identity = QueryIdentity::profile(username.clone());
        Self::new(MutationKind::ToggleFollow, network_call)
            .target(identity)
            .optimistic(move |_, previous| patch::toggle_follow(previous, &username))
            .reconcile(|receipt: &FollowReceipt, input| {
                let mut value = input.current?.clone();
                value.patch_profiles(&receipt.profile_id, |profile| receipt.apply_to(profile));
                Some(value)
            })
            .also_invalidate(IdentityPattern::kind(QueryKind::FollowingList))
    }
}

impl MutationSpec<Comment> {
    /// Show a provisional comment under a fresh client-side id until the server
    /// answers, then swap the server record into the same position.
    pub fn create_comment<F>(cache: &QueryCache, input: NewComment, network_call: F) -> Self
    where
        F: Future<Output = BackendResult<Comment>> + Send + 'static,
    {
        let now = Utc::now();
        let provisional = Comment {
            id: cache.next_provisional_id(),
            post_id: input.post_id.clone(),
            parent_id: input.parent_id,
            author_id: input.author_id,
            content: input.content,
            created_at: now,
            updated_at: now,
            optimistic: true,
        };
        let window = cache.config().comment_match_window();
        let inserted = provisional.clone();
        Self::new(MutationKind::CreateComment, network_call)
            .target(QueryIdentity::comments_for_post(&input.post_id))
            .optimistic(move |_, previous| patch::create_comment(previous, &provisional))
            .reconcile(move |server: &Comment, input| {
                patch::reconcile_created_comment(input.current, &inserted, server, window)
            })
            .also_invalidate(IdentityPattern::from(&QueryIdentity::post_detail(
                &input.post_id,
            )))
    }

    pub fn update_comment<F>(
        post_id: PostId,
        comment_id: CommentId,
        content: impl Into<String>,
        network_call: F,
    ) -> Self
    where
        F: Future<Output = BackendResult<Comment>> + Send + 'static,
    {
        let content = content.into();
        Self::new(MutationKind::UpdateComment, network_call)
            .target(QueryIdentity::comments_for_post(&post_id))
            .optimistic(move |_, previous| {
                patch::update_comment(previous, &comment_id, &content, Utc::now())
            })
            .reconcile(|server: &Comment, input| {
                patch::replace_comment(input.current, server).or_else(|| input.current.cloned())
            })
    }
}

impl MutationSpec<()> {
    /// Delete a post. Nothing is shown optimistically; every post list and feed,
    /// plus the post's own detail, is invalidated once settled.
    pub fn delete_post<F>(post_id: PostId, network_call: F) -> Self
    where
        F: Future<Output = BackendResult<()>> + Send + 'static,
    {
        Self::new(MutationKind::DeletePost, network_call)
            .also_invalidate(IdentityPattern::kind(QueryKind::PostList))
            .also_invalidate(IdentityPattern::kind(QueryKind::PostFeed))
            .also_invalidate(IdentityPattern::from(&QueryIdentity::post_detail(&post_id)))
    }

    /// Replace the tags of a post. Settlement invalidates the post's tag list and
    /// every post query, since posts embed their tags.
    pub fn add_post_tags<F>(post_id: PostId, network_call: F) -> Self
    where
        F: Future<Output = BackendResult<()>> + Send + 'static,
    {
        QueryKind::POST_FAMILY.into_iter().fold(
            Self::new(MutationKind::AddPostTags, network_call)
                .also_invalidate(IdentityPattern::from(&QueryIdentity::post_tags(&post_id))),
            |spec, kind| spec.also_invalidate(IdentityPattern::kind(kind)),
        )
    }

    pub fn delete_comment<F>(post_id: PostId, comment_id: CommentId, network_call: F) -> Self
    where
        F: Future<Output = BackendResult<()>> + Send + 'static,
    {
        Self::new(MutationKind::DeleteComment, network_call)
            .target(QueryIdentity::comments_for_post(&post_id))
            .optimistic(move |_, previous| patch::delete_comment(previous, &comment_id))
            .also_invalidate(IdentityPattern::from(&QueryIdentity::post_detail(&post_id)))
    }
}

impl MutationSpec<Profile> {
    pub fn update_profile<F>(
        username: impl Into<String>,
        update: ProfileUpdate,
        network_call: F,
    ) -> Self
    where
        F: Future<Output = BackendResult<Profile>> + Send + 'static,
    {
        Self::new(MutationKind::UpdateProfile, network_call)
            .target(QueryIdentity::profile(username))
            .optimistic(move |_, previous| patch::update_profile(previous, &update))
            .reconcile(|server: &Profile, _| Some(CacheValue::Profile(server.clone())))
            .also_invalidate(IdentityPattern::kind(QueryKind::Profile))
    }
}

impl MutationSpec<Post> {
    /// Create a post. The server picks the id and final slug, so nothing is
    /// shown optimistically; post lists, feeds and the author's posts are
    /// invalidated once settled.
    pub fn create_post<F>(input: &NewPost, network_call: F) -> Self
    where
        F: Future<Output = BackendResult<Post>> + Send + 'static,
    {
        Self::new(MutationKind::CreatePost, network_call)
            .also_invalidate(IdentityPattern::kind(QueryKind::PostList))
            .also_invalidate(IdentityPattern::kind(QueryKind::PostFeed))
            .also_invalidate(IdentityPattern::from(&QueryIdentity::user_posts(
                &input.author_id,
            )))
    }

    pub fn update_post<F>(post_id: PostId, update: PostUpdate, network_call: F) -> Self
    where
        F: Future<Output = BackendResult<Post>> + Send + 'static,
    {
        let optimistic_id = post_id.clone();
        let propagated_update = update.clone();
        Self::new(MutationKind::UpdatePost, network_call)
            .target(QueryIdentity::post_detail(&post_id))
            .optimistic(move |_, previous| patch::update_post(previous, &optimistic_id, &update))
            .reconcile(|server: &Post, _| Some(CacheValue::Post(server.clone())))
            .propagate(
                post_id,
                move |post| *post = propagated_update.apply_to(post),
                |server: &Post, post| *post = server.clone(),
            )
            .also_invalidate(IdentityPattern::kind(QueryKind::PostBySlug))
    }
}
