//! PLUME Cache - Optimistic Mutation Cache
//!
//! Keeps a blogging client's view of posts, comments, profiles and tags in a
//! normalized query cache, and makes likes, saves, follows, comment edits and
//! profile edits appear instantly while the backend call is in flight.
//! Success reconciles to the server's answer, failure rolls back to a
//! per-mutation snapshot, and both invalidate what they touched.

pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod mutation;
pub mod notifications;
pub mod patch;
pub mod persistence;
pub mod query;
pub mod value;

pub use cache::{
    CacheEntry, CacheEvent, CacheEventKind, CacheRead, CacheStats, Freshness, QueryCache,
    QueryFetcher, Subscription,
};
pub use config::{CacheConfig, ConfigError};
pub use error::{PlumeError, PlumeResult};
pub use feed::FeedAccumulator;
pub use mutation::{
    AuthRequired, ItemPropagation, MutationExecutor, MutationHandle, MutationKind, MutationSpec,
    MutationStatus, PendingMutation, ReconcileInput,
};
pub use notifications::{Notification, NotificationAction, NotificationLevel};
pub use persistence::{CacheSnapshot, PersistenceError};
pub use query::{IdentityPattern, QueryIdentity, QueryKind};
pub use value::{CacheValue, FeedPages};
