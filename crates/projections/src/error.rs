//! Read path error types.

use thiserror::Error;

/// Errors that can occur while reading the catalog.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the record store.
    #[error("Store error: {0}")]
    Store(#[from] record_store::StoreError),
}

impl ProjectionError {
    /// Returns true if retrying the read may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProjectionError::Store(e) => e.is_transient(),
        }
    }
}

/// Result type for read operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
