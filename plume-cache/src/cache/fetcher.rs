//! Backend query collaborator.

use async_trait::async_trait;
use plume_core::BackendResult;

use crate::query::QueryIdentity;
use crate::value::CacheValue;

/// Fetches the authoritative value of a query from the backend.
///
/// Used for read-through fetches and for the background refetch scheduled when
/// a subscribed identity is invalidated. Transport concerns (requests,
/// retries, timeouts) belong to the implementation.
#[async_trait]
pub trait QueryFetcher: Send + Sync {
    async fn fetch(&self, identity: &QueryIdentity) -> BackendResult<CacheValue>;
}
