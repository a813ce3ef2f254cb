//! Core entity structures
//!
//! These are opaque payloads to the cache. The cache only touches the few
//! fields an optimistic patch names: counts, viewer flags and list membership.

use crate::{CommentId, PostId, PostStatus, ProfileId, TagId, Timestamp};
use serde::{Deserialize, Serialize};

/// Tag attached to posts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

/// Blog post as seen by the current viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: ProfileId,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub status: PostStatus,
    pub likes_count: u64,
    pub comments_count: u64,
    pub saves_count: u64,
    /// Whether the viewer has liked this post.
    pub is_liked: bool,
    /// Whether the viewer has saved this post.
    pub is_saved: bool,
    pub tags: Vec<Tag>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Comment on a post. Threading is one level deep via `parent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub author_id: ProfileId,
    pub content: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Set on records the server has not confirmed yet; UIs may render them dimmed.
    #[serde(default)]
    pub optimistic: bool,
}

/// Public profile of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub username: String,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub avatar_url: Option<String>,
    pub links: Vec<String>,
    pub followers_count: u64,
    pub following_count: u64,
    /// Whether the viewer follows this profile.
    pub is_following: bool,
}

// ============================================================================
// MUTATION INPUTS
// ============================================================================

/// Input for creating a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub author_id: ProfileId,
    pub content: String,
}

/// Input for creating a post. The server assigns the id and makes the slug unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub author_id: ProfileId,
    pub title: String,
    pub slug: String,
    pub content: String,
    #[serde(default)]
    pub status: PostStatus,
}

/// Partial profile update. `None` fields keep their previous value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub avatar_url: Option<String>,
    pub links: Option<Vec<String>>,
}

impl ProfileUpdate {
    /// Merge the submitted fields over `previous`.
    pub fn apply_to(&self, previous: &Profile) -> Profile {
        let mut next = previous.clone();
        if let Some(username) = &self.username {
            next.username = username.clone();
        }
        if let Some(bio) = &self.bio {
            next.bio = Some(bio.clone());
        }
        if let Some(website) = &self.website {
            next.website = Some(website.clone());
        }
        if let Some(avatar_url) = &self.avatar_url {
            next.avatar_url = Some(avatar_url.clone());
        }
        if let Some(links) = &self.links {
            next.links = links.clone();
        }
        next
    }
}

/// Partial post edit. `None` fields keep their previous value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: Option<PostStatus>,
    pub tags: Option<Vec<Tag>>,
}

impl PostUpdate {
    pub fn apply_to(&self, previous: &Post) -> Post {
        let mut next = previous.clone();
        if let Some(title) = &self.title {
            next.title = title.clone();
        }
        if let Some(content) = &self.content {
            next.content = content.clone();
        }
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(tags) = &self.tags {
            next.tags = tags.clone();
        }
        next
    }
}

// ============================================================================
// SERVER RECEIPTS
// ============================================================================

/// Server-confirmed like state of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeReceipt {
    pub post_id: PostId,
    pub is_liked: bool,
    pub likes_count: u64,
}

/// Server-confirmed save state of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReceipt {
    pub post_id: PostId,
    pub is_saved: bool,
    pub saves_count: u64,
}

/// Server-confirmed follow state of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowReceipt {
    pub profile_id: ProfileId,
    pub is_following: bool,
    pub followers_count: u64,
}

impl LikeReceipt {
    pub fn apply_to(&self, post: &mut Post) {
        post.is_liked = self.is_liked;
        post.likes_count = self.likes_count;
    }
}

impl SaveReceipt {
    pub fn apply_to(&self, post: &mut Post) {
        post.is_saved = self.is_saved;
        post.saves_count = self.saves_count;
    }
}

impl FollowReceipt {
    pub fn apply_to(&self, profile: &mut Profile) {
        profile.is_following = self.is_following;
        profile.followers_count = self.followers_count;
    }
}
