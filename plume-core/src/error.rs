//! Error types shared by the backend collaborator and the mutation executor

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Discriminated reason carried by a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Transport failure, surfaced generically.
    Network,
    /// The caller must (re-)authenticate.
    Unauthorized,
    /// Caller-supplied input was rejected.
    Validation,
    /// The resource was concurrently modified or deleted.
    Conflict,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            FailureReason::Network => "network",
            FailureReason::Unauthorized => "unauthorized",
            FailureReason::Validation => "validation",
            FailureReason::Conflict => "conflict",
        };
        write!(f, "{}", value)
    }
}

/// Error returned by a backend collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{reason} error: {message}")]
pub struct BackendError {
    pub reason: FailureReason,
    pub message: String,
}

impl BackendError {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureReason::Network, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(FailureReason::Unauthorized, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureReason::Validation, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(FailureReason::Conflict, message)
    }
}

/// Result of a backend collaborator call.
pub type BackendResult<T> = Result<T, BackendError>;

/// Terminal failure of a mutation. Every variant rolls the cache back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Authentication required: {message}")]
    Unauthorized { message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Mutation cancelled before settlement")]
    Cancelled,
}

impl MutationError {
    /// The backend reason, or `None` for cancellation.
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            MutationError::Network { .. } => Some(FailureReason::Network),
            MutationError::Unauthorized { .. } => Some(FailureReason::Unauthorized),
            MutationError::Validation { .. } => Some(FailureReason::Validation),
            MutationError::Conflict { .. } => Some(FailureReason::Conflict),
            MutationError::Cancelled => None,
        }
    }

    /// True when the user has to sign in before retrying.
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, MutationError::Unauthorized { .. })
    }

    /// Description suitable for inline display or a toast.
    ///
    /// Validation and conflict messages come from the backend verbatim; transport
    /// failures get a generic description.
    pub fn user_message(&self) -> String {
        match self {
            MutationError::Network { .. } => "Something went wrong. Please try again.".to_string(),
            MutationError::Unauthorized { .. } => "Please sign in to continue".to_string(),
            MutationError::Validation { message } | MutationError::Conflict { message } => {
                message.clone()
            }
            MutationError::Cancelled => "The action was interrupted".to_string(),
        }
    }
}

impl From<BackendError> for MutationError {
    fn from(err: BackendError) -> Self {
        let message = err.message;
        match err.reason {
            FailureReason::Network => MutationError::Network { message },
            FailureReason::Unauthorized => MutationError::Unauthorized { message },
            FailureReason::Validation => MutationError::Validation { message },
            FailureReason::Conflict => MutationError::Conflict { message },
        }
    }
}
