//! Cache snapshots across application restarts.
//!
//! Only confirmed entries without in-flight mutations are written, so a
//! snapshot never captures an optimistic guess. Everything loaded back is
//! marked stale and gets revalidated on its next consistent read.

use chrono::Utc;
use plume_core::Timestamp;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::cache::QueryCache;
use crate::query::QueryIdentity;
use crate::value::CacheValue;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub identity: QueryIdentity,
    pub value: CacheValue,
    pub confirmed_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub schema_version: u32,
    pub saved_at: Timestamp,
    pub entries: Vec<PersistedEntry>,
}

impl CacheSnapshot {
    pub fn capture(cache: &QueryCache) -> Self {
        let entries = cache
            .confirmed_entries()
            .into_iter()
            .map(|(identity, value, confirmed_at)| PersistedEntry {
                identity,
                value,
                confirmed_at,
            })
            .collect();
        Self {
            schema_version: SCHEMA_VERSION,
            saved_at: Utc::now(),
            entries,
        }
    }

    /// Insert entries the cache does not already hold. Returns how many.
    pub fn restore(self, cache: &QueryCache) -> Result<usize, PersistenceError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(PersistenceError::SchemaVersion {
                found: self.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(self
            .entries
            .into_iter()
            .filter(|entry| {
                cache.hydrate(entry.identity.clone(), entry.value.clone(), entry.confirmed_at)
            })
            .count())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Unsupported snapshot schema version {found} (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },
}

/// Load a snapshot into `cache`. A missing file loads nothing.
pub fn load(path: &Path, cache: &QueryCache) -> Result<usize, PersistenceError> {
    if !path.exists() {
        return Ok(0);
    }
    let contents = std::fs::read_to_string(path)?;
    let snapshot = serde_json::from_str::<CacheSnapshot>(&contents)?;
    let restored = snapshot.restore(cache)?;
    info!(path = %path.display(), restored, "cache snapshot loaded");
    Ok(restored)
}

/// Write the confirmed part of `cache` to `path`. Returns how many entries.
pub fn save(path: &Path, cache: &QueryCache) -> Result<usize, PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let snapshot = CacheSnapshot::capture(cache);
    let count = snapshot.entries.len();
    let contents = serde_json::to_string_pretty(&snapshot)?;
    std::fs::write(path, contents)?;
    info!(path = %path.display(), entries = count, "cache snapshot saved");
    Ok(count)
}
