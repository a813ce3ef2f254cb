//! Normalized query cache with explicit freshness.
//!
//! Every cached query is addressed by a [`QueryIdentity`](crate::QueryIdentity)
//! and holds a [`CacheEntry`]: the last known value, when the server last
//! confirmed it, whether it has been invalidated since, and how many optimistic
//! writers are still in flight.
//!
//! # Freshness
//!
//! Plain [`QueryCache::read`] returns whatever the cache holds. Read-through
//! fetches make staleness explicit: callers state their tolerance via
//! [`Freshness`] and get back a [`CacheRead<T>`] carrying the metadata.
//!
//! # Example
//!
//! ```ignore
//! let cache = QueryCache::with_fetcher(CacheConfig::default(), fetcher);
//!
//! // Accept anything confirmed in the last minute, even if invalidated since
//! let read = cache
//!     .fetch(&QueryIdentity::tags(), Freshness::best_effort(Duration::from_secs(60)))
//!     .await?;
//!
//! // Or demand a value nothing has invalidated
//! let read = cache.fetch(&QueryIdentity::post_list(), Freshness::Consistent).await?;
//!
//! let _sub = cache.subscribe(&QueryIdentity::post_list(), |event| {
//!     tracing::debug!(identity = %event.identity, "post list changed");
//! });
//! ```

pub mod entry;
pub mod fetcher;
pub mod freshness;
pub mod store;
pub mod subscription;

pub use entry::{CacheEntry, CacheStats};
pub use fetcher::QueryFetcher;
pub use freshness::{CacheRead, Freshness};
pub use store::QueryCache;
pub use subscription::{CacheEvent, CacheEventKind, SubscriberFn, Subscription};
