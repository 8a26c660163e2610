//! Lock error types

use std::time::Duration;
use thiserror::Error;

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Distributed lock errors
#[derive(Debug, Error)]
pub enum LockError {
    /// Malformed lock request, rejected before any store I/O
    #[error("Invalid lock argument: {0}")]
    InvalidArgument(String),

    /// The wait budget ran out while another holder kept the lock
    #[error("Lock unavailable: {key} (waited {waited:?})")]
    Unavailable {
        /// Composed store key
        key: String,
        /// Wait budget that was exhausted
        waited: Duration,
    },

    /// The store could not be reached or rejected the command
    #[error("Lock store error: {0}")]
    Store(String),

    /// The record no longer held our token when we tried to release it
    #[error("Lock not held (lease expired or taken over): {key}")]
    ReleaseMismatch {
        /// Composed store key
        key: String,
    },

    /// Redis client error
    #[error("Redis error: {0}")]
    Redis(#[from] keylock_redis::RedisError),
}

impl LockError {
    /// Create a new invalid argument error
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a new store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    /// Create an unavailable error
    pub fn unavailable(key: impl Into<String>, waited: Duration) -> Self {
        Self::Unavailable {
            key: key.into(),
            waited,
        }
    }

    /// Check if the lock simply could not be obtained in time
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Check if this is a store communication failure
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Redis(_))
    }

    /// Whether retrying the same call later can succeed.
    ///
    /// Invalid arguments never become valid; everything else may.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidArgument(_) => false,
            Self::Redis(err) => err.is_retryable(),
            _ => true,
        }
    }
}
