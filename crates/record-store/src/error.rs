use thiserror::Error;

use crate::RecordKey;

/// Errors that can occur when interacting with the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached. Retrying may succeed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The update request itself is invalid and will never succeed.
    #[error("Invalid update for {key}: {message}")]
    InvalidUpdate { key: RecordKey, message: String },

    /// A scan filter expression could not be parsed or references unknown
    /// placeholders.
    #[error("Invalid filter expression: {0}")]
    InvalidExpression(String),

    /// A pagination cursor could not be decoded.
    #[error("Invalid pagination cursor: {0}")]
    InvalidCursor(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if the failed operation may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
