//! Error type for storage backends.
//!
//! Token stores and other shared backends report failures through
//! [`PlatformError`]. Callers only need two answers from it: which entry was
//! involved, and whether trying again later can succeed.

use std::time::Duration;

use thiserror::Error;

/// Failure of a backend operation.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// An entry with the same key is already stored
    #[error("Entry '{key}' already exists")]
    Conflict {
        /// Key of the existing entry
        key: String,
    },

    /// Backend cannot be reached right now
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Backend did not answer in time
    #[error("Backend call timed out after {}ms", .elapsed.as_millis())]
    Timeout {
        /// Time waited before giving up
        elapsed: Duration,
    },

    /// The entry was rejected before reaching the backend
    #[error("Invalid entry: {0}")]
    InvalidInput(String),

    /// Backend failed in a way retrying will not fix
    #[error("Backend failure: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Whether the operation may succeed if repeated later.
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_common::PlatformError;
    ///
    /// assert!(PlatformError::unavailable("store offline").is_retryable());
    /// assert!(!PlatformError::conflict("tok-1").is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }

    /// Key of the conflicting entry, if this is a conflict.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Conflict { key } => Some(key),
            _ => None,
        }
    }

    /// Conflict on `key`.
    #[must_use]
    pub fn conflict(key: impl Into<String>) -> Self {
        Self::Conflict { key: key.into() }
    }

    /// Transient unavailability.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    /// Timeout after `elapsed`.
    #[must_use]
    pub const fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    /// Rejected entry.
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }

    /// Permanent backend failure.
    #[must_use]
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}
