//! Error types for the cache crate.

use plume_core::{BackendError, MutationError};

use crate::config::ConfigError;
use crate::persistence::PersistenceError;

#[derive(Debug, thiserror::Error)]
pub enum PlumeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error("No query fetcher configured to fetch {identity}")]
    NoFetcher { identity: String },
}

/// Result type alias for PLUME cache operations.
pub type PlumeResult<T> = Result<T, PlumeError>;
