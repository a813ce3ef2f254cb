//! Freshness contracts for read-through fetches.
//!
//! Callers state how much staleness they tolerate when asking the cache to
//! answer a query, and get back a [`CacheRead`] that says where the data came
//! from and how old it is.

use chrono::Utc;
use plume_core::Timestamp;
use std::time::Duration;

/// Freshness requirement for read-through fetches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Accept a confirmed value up to the specified age, even if it has been
    /// invalidated since. Older values are refetched.
    BestEffort {
        /// Maximum acceptable age of the last server confirmation.
        max_staleness: Duration,
    },

    /// Only accept a confirmed value that has not been invalidated.
    #[default]
    Consistent,
}

impl Freshness {
    pub fn best_effort(max_staleness: Duration) -> Self {
        Self::BestEffort { max_staleness }
    }

    pub fn consistent() -> Self {
        Self::Consistent
    }

    pub fn is_best_effort(&self) -> bool {
        matches!(self, Self::BestEffort { .. })
    }

    pub fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }

    /// Get the max staleness for BestEffort, or zero for Consistent.
    pub fn max_staleness(&self) -> Duration {
        match self {
            Self::BestEffort { max_staleness } => *max_staleness,
            Self::Consistent => Duration::ZERO,
        }
    }
}

/// Result of a read-through fetch, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    confirmed_at: Timestamp,
    was_cache_hit: bool,
    is_stale: bool,
}

impl<T> CacheRead<T> {
    /// A read answered from the cache.
    pub fn from_cache(value: T, confirmed_at: Timestamp, is_stale: bool) -> Self {
        Self {
            value,
            confirmed_at,
            was_cache_hit: true,
            is_stale,
        }
    }

    /// A read answered by the backend (cache miss or too stale).
    pub fn from_backend(value: T) -> Self {
        Self {
            value,
            confirmed_at: Utc::now(),
            was_cache_hit: false,
            is_stale: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Duration since the server last confirmed the value.
    pub fn staleness(&self) -> Duration {
        let now = Utc::now();
        if now > self.confirmed_at {
            (now - self.confirmed_at).to_std().unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }

    pub fn confirmed_at(&self) -> Timestamp {
        self.confirmed_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// Whether the value had been invalidated when it was served.
    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            confirmed_at: self.confirmed_at,
            was_cache_hit: self.was_cache_hit,
            is_stale: self.is_stale,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
