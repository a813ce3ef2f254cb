//! Query identities: the keys of the normalized cache.
//!
//! A [`QueryIdentity`] is an ordered `(kind, params)` tuple. Two identities are
//! equal iff the kind and every parameter match. An [`IdentityPattern`] selects
//! every identity of a kind whose parameters start with a given prefix, which is
//! how related queries are invalidated in bulk ("all post lists").

use plume_core::{PostId, ProfileId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity kind of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryKind {
    PostList,
    PostFeed,
    PostDetail,
    PostBySlug,
    CommentList,
    SavedPostList,
    UserPosts,
    Profile,
    FollowingList,
    TagList,
    PostTags,
}

impl QueryKind {
    /// Kinds served from the blog's post queries: lists, feeds, single posts
    /// and their comment threads.
    pub const POST_FAMILY: [QueryKind; 5] = [
        QueryKind::PostList,
        QueryKind::PostFeed,
        QueryKind::PostDetail,
        QueryKind::PostBySlug,
        QueryKind::CommentList,
    ];

    /// Kinds whose values are posts or sequences of posts.
    pub fn holds_posts(&self) -> bool {
        matches!(
            self,
            QueryKind::PostList
                | QueryKind::PostFeed
                | QueryKind::PostDetail
                | QueryKind::PostBySlug
                | QueryKind::SavedPostList
                | QueryKind::UserPosts
        )
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            QueryKind::PostList => "post-list",
            QueryKind::PostFeed => "post-feed",
            QueryKind::PostDetail => "post-detail",
            QueryKind::PostBySlug => "post-by-slug",
            QueryKind::CommentList => "comment-list-for-post",
            QueryKind::SavedPostList => "saved-post-list",
            QueryKind::UserPosts => "user-posts",
            QueryKind::Profile => "profile",
            QueryKind::FollowingList => "following-list",
            QueryKind::TagList => "tag-list",
            QueryKind::PostTags => "post-tags",
        };
        write!(f, "{}", value)
    }
}

/// Cache key: entity kind plus disambiguating parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryIdentity {
    kind: QueryKind,
    params: Vec<String>,
}

impl QueryIdentity {
    pub fn new<I, S>(kind: QueryKind, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Identity with no parameters.
    pub fn of(kind: QueryKind) -> Self {
        Self {
            kind,
            params: Vec::new(),
        }
    }

    pub fn post_list() -> Self {
        Self::of(QueryKind::PostList)
    }

    pub fn post_list_filtered(filters: impl Into<String>) -> Self {
        Self::new(QueryKind::PostList, [filters.into()])
    }

    /// Infinite-scroll home feed of a viewer.
    pub fn post_feed(viewer: &ProfileId) -> Self {
        Self::new(QueryKind::PostFeed, [viewer.as_str()])
    }

    pub fn post_detail(post_id: &PostId) -> Self {
        Self::new(QueryKind::PostDetail, [post_id.as_str()])
    }

    pub fn post_by_slug(slug: impl Into<String>) -> Self {
        Self::new(QueryKind::PostBySlug, [slug.into()])
    }

    pub fn comments_for_post(post_id: &PostId) -> Self {
        Self::new(QueryKind::CommentList, [post_id.as_str()])
    }

    pub fn saved_posts() -> Self {
        Self::of(QueryKind::SavedPostList)
    }

    pub fn user_posts(author: &ProfileId) -> Self {
        Self::new(QueryKind::UserPosts, [author.as_str()])
    }

    pub fn profile(username: impl Into<String>) -> Self {
        Self::new(QueryKind::Profile, [username.into()])
    }

    pub fn following(user: &ProfileId) -> Self {
        Self::new(QueryKind::FollowingList, [user.as_str()])
    }

    pub fn tags() -> Self {
        Self::of(QueryKind::TagList)
    }

    pub fn post_tags(post_id: &PostId) -> Self {
        Self::new(QueryKind::PostTags, [post_id.as_str()])
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl fmt::Display for QueryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for param in &self.params {
            write!(f, "/{}", param)?;
        }
        Ok(())
    }
}

/// Selects identities by kind and parameter prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityPattern {
    kind: QueryKind,
    prefix: Vec<String>,
}

impl IdentityPattern {
    /// Every identity of `kind`.
    pub fn kind(kind: QueryKind) -> Self {
        Self {
            kind,
            prefix: Vec::new(),
        }
    }

    /// Narrow the pattern by one more leading parameter.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.prefix.push(param.into());
        self
    }

    pub fn matches(&self, identity: &QueryIdentity) -> bool {
        identity.kind == self.kind && identity.params.starts_with(&self.prefix)
    }
}

impl From<&QueryIdentity> for IdentityPattern {
    fn from(identity: &QueryIdentity) -> Self {
        Self {
            kind: identity.kind,
            prefix: identity.params.clone(),
        }
    }
}
