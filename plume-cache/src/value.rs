//! Payload shapes held by cache entries.

use plume_core::{Comment, Post, PostId, Profile, ProfileId, Tag};
use serde::{Deserialize, Serialize};

/// Accumulated pages of an infinite-scroll sequence of posts.
///
/// Pages are kept as the server returned them; the logical sequence is their
/// concatenation. Once the server stops returning a continuation cursor the
/// feed is exhausted and further pages are ignored until it is reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPages {
    pages: Vec<Vec<Post>>,
    next_cursor: Option<String>,
    has_more: bool,
}

impl Default for FeedPages {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            next_cursor: None,
            has_more: true,
        }
    }
}

impl FeedPages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a page. Returns false (and changes nothing) when exhausted.
    pub fn push_page(&mut self, items: Vec<Post>, cursor: Option<String>) -> bool {
        if !self.has_more {
            return false;
        }
        if !items.is_empty() {
            self.pages.push(items);
        }
        self.has_more = cursor.is_some();
        self.next_cursor = cursor;
        true
    }

    pub fn pages(&self) -> &[Vec<Post>] {
        &self.pages
    }

    /// The logical sequence across all pages.
    pub fn items(&self) -> impl Iterator<Item = &Post> {
        self.pages.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_cursor(&self) -> Option<&str> {
        self.next_cursor.as_deref()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    fn items_mut(&mut self) -> impl Iterator<Item = &mut Post> {
        self.pages.iter_mut().flatten()
    }
}

/// Value stored under a query identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum CacheValue {
    Post(Post),
    Posts(Vec<Post>),
    Feed(FeedPages),
    Comments(Vec<Comment>),
    Profile(Profile),
    Profiles(Vec<Profile>),
    Tags(Vec<Tag>),
}

impl CacheValue {
    pub fn shape(&self) -> &'static str {
        match self {
            CacheValue::Post(_) => "post",
            CacheValue::Posts(_) => "posts",
            CacheValue::Feed(_) => "feed",
            CacheValue::Comments(_) => "comments",
            CacheValue::Profile(_) => "profile",
            CacheValue::Profiles(_) => "profiles",
            CacheValue::Tags(_) => "tags",
        }
    }

    pub fn as_post(&self) -> Option<&Post> {
        match self {
            CacheValue::Post(post) => Some(post),
            _ => None,
        }
    }

    pub fn as_posts(&self) -> Option<&[Post]> {
        match self {
            CacheValue::Posts(posts) => Some(posts),
            _ => None,
        }
    }

    pub fn as_feed(&self) -> Option<&FeedPages> {
        match self {
            CacheValue::Feed(feed) => Some(feed),
            _ => None,
        }
    }

    pub fn as_comments(&self) -> Option<&[Comment]> {
        match self {
            CacheValue::Comments(comments) => Some(comments),
            _ => None,
        }
    }

    pub fn as_profile(&self) -> Option<&Profile> {
        match self {
            CacheValue::Profile(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn as_profiles(&self) -> Option<&[Profile]> {
        match self {
            CacheValue::Profiles(profiles) => Some(profiles),
            _ => None,
        }
    }

    /// First post with `post_id`, wherever it sits in this value.
    pub fn find_post(&self, post_id: &PostId) -> Option<&Post> {
        match self {
            CacheValue::Post(post) => Some(post).filter(|p| &p.id == post_id),
            CacheValue::Posts(posts) => posts.iter().find(|p| &p.id == post_id),
            CacheValue::Feed(feed) => feed.items().find(|p| &p.id == post_id),
            _ => None,
        }
    }

    pub fn contains_post(&self, post_id: &PostId) -> bool {
        self.find_post(post_id).is_some()
    }

    /// Apply `f` to every post with `post_id`. Returns how many were touched.
    pub fn patch_posts<F>(&mut self, post_id: &PostId, mut f: F) -> usize
    where
        F: FnMut(&mut Post),
    {
        let mut touched = 0;
        let mut apply = |post: &mut Post| {
            if &post.id == post_id {
                f(post);
                touched += 1;
            }
        };
        match self {
            CacheValue::Post(post) => apply(post),
            CacheValue::Posts(posts) => posts.iter_mut().for_each(apply),
            CacheValue::Feed(feed) => feed.items_mut().for_each(apply),
            _ => {}
        }
        touched
    }

    /// Apply `f` to every profile with `profile_id`. Returns how many were touched.
    pub fn patch_profiles<F>(&mut self, profile_id: &ProfileId, mut f: F) -> usize
    where
        F: FnMut(&mut Profile),
    {
        let mut touched = 0;
        let mut apply = |profile: &mut Profile| {
            if &profile.id == profile_id {
                f(profile);
                touched += 1;
            }
        };
        match self {
            CacheValue::Profile(profile) => apply(profile),
            CacheValue::Profiles(profiles) => profiles.iter_mut().for_each(apply),
            _ => {}
        }
        touched
    }
}
