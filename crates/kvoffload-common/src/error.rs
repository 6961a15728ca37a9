//! Error types for kvoffload
//!
//! Only structural problems are errors. Cache misses, races between
//! classification and translation, and out-of-order writes are ordinary
//! outcomes and are reported as values, not through this type.

use crate::types::LocationError;
use thiserror::Error;

/// Common result type for kvoffload operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for kvoffload
#[derive(Debug, Error)]
pub enum Error {
    // Cache entry errors
    #[error("invalid physical location: {0}")]
    InvalidLocation(#[from] LocationError),

    #[error("invalid cache entry: {0}")]
    InvalidEntry(String),

    #[error("key must not be empty")]
    EmptyKey,

    // Setup errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create an invalid entry error
    pub fn invalid_entry(msg: impl Into<String>) -> Self {
        Self::InvalidEntry(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this error rejected a cache mutation, leaving the table unchanged
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidLocation(_) | Self::InvalidEntry(_) | Self::EmptyKey
        )
    }
}
