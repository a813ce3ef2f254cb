//! Infinite-scroll feed accumulation on top of the query cache.

use plume_core::{Post, PostId};
use tracing::debug;

use crate::cache::QueryCache;
use crate::query::QueryIdentity;
use crate::value::{CacheValue, FeedPages};

/// Merges server pages for an identity into one [`FeedPages`] value.
///
/// All state lives in the cache, so subscribers to a feed identity see page
/// appends and item patches like any other write.
#[derive(Debug, Clone)]
pub struct FeedAccumulator {
    cache: QueryCache,
}

impl FeedAccumulator {
    pub fn new(cache: QueryCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn feed(&self, identity: &QueryIdentity) -> Option<FeedPages> {
        match self.cache.peek(identity)? {
            CacheValue::Feed(feed) => Some(feed),
            _ => None,
        }
    }

    /// Append a server page and replace the continuation cursor.
    ///
    /// A missing cursor exhausts the feed; appends to an exhausted feed are
    /// ignored until [`reset`](Self::reset). Returns whether the page was taken.
    pub fn append_page(
        &self,
        identity: &QueryIdentity,
        items: Vec<Post>,
        cursor: Option<String>,
    ) -> bool {
        let mut feed = self.feed(identity).unwrap_or_default();
        if !feed.push_page(items, cursor) {
            debug!(identity = %identity, "feed exhausted, ignoring page");
            return false;
        }
        self.cache.write(identity, CacheValue::Feed(feed), true);
        true
    }

    /// Apply `f` to every copy of the item in the feed. Other items and the
    /// cursor are untouched. Returns how many copies were patched.
    pub fn patch_item<F>(&self, identity: &QueryIdentity, item_id: &PostId, f: F) -> usize
    where
        F: FnMut(&mut Post),
    {
        let mut touched = 0;
        self.cache.modify(identity, |value| {
            touched = value.patch_posts(item_id, f);
            touched > 0
        });
        touched
    }

    /// Drop all pages and the cursor, e.g. after the query's filters change.
    pub fn reset(&self, identity: &QueryIdentity) {
        self.cache
            .write(identity, CacheValue::Feed(FeedPages::default()), false);
    }

    pub fn items(&self, identity: &QueryIdentity) -> Vec<Post> {
        self.feed(identity)
            .map(|feed| feed.items().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether another page may follow. An unknown feed has more.
    pub fn has_more(&self, identity: &QueryIdentity) -> bool {
        self.feed(identity).map_or(true, |feed| feed.has_more())
    }

    pub fn next_cursor(&self, identity: &QueryIdentity) -> Option<String> {
        self.feed(identity)?.next_cursor().map(str::to_string)
    }

    pub fn page_count(&self, identity: &QueryIdentity) -> usize {
        self.feed(identity).map_or(0, |feed| feed.pages().len())
    }
}
