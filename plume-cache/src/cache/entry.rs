//! Cache entries and usage statistics.

use chrono::Utc;
use plume_core::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::freshness::Freshness;
use crate::value::CacheValue;

/// Snapshot of one cached query.
///
/// `value` is `None` for an entry that exists only because it was invalidated or
/// optimistically targeted before anything was fetched. That is still distinct
/// from a miss, which is the absence of an entry altogether.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Option<CacheValue>,
    /// When the server last confirmed `value`; `None` if it never has.
    pub last_confirmed_at: Option<Timestamp>,
    pub is_stale: bool,
    /// Number of pending optimistic writers targeting this entry.
    pub inflight_mutation_count: u32,
}

impl CacheEntry {
    pub(crate) fn empty() -> Self {
        Self {
            value: None,
            last_confirmed_at: None,
            is_stale: false,
            inflight_mutation_count: 0,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.last_confirmed_at.is_some()
    }

    pub fn has_inflight_mutations(&self) -> bool {
        self.inflight_mutation_count > 0
    }

    /// Time since the last confirmation, or `None` if never confirmed.
    pub fn age(&self) -> Option<Duration> {
        self.last_confirmed_at.map(|at| {
            Utc::now()
                .signed_duration_since(at)
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
    }

    /// Whether this entry can answer a read with the given freshness contract.
    ///
    /// - `Consistent` needs a confirmed value that has not been invalidated.
    /// - `BestEffort` needs a confirmed value no older than `max_staleness`,
    ///   even if it has been invalidated.
    pub fn satisfies(&self, freshness: &Freshness) -> bool {
        if self.value.is_none() {
            return false;
        }
        let Some(age) = self.age() else {
            return false;
        };
        match freshness {
            Freshness::Consistent => !self.is_stale,
            Freshness::BestEffort { max_staleness } => age <= *max_staleness,
        }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that found an entry.
    pub hits: u64,
    /// Reads that found nothing.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    pub confirmed_writes: u64,
    pub optimistic_writes: u64,
    pub invalidations: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
