//! Pipeline error types.

use std::time::Duration;

use domain::{MalformedEvent, TableError};
use record_store::StoreError;
use thiserror::Error;

/// How the transport should treat a failed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retrying cannot help; dead-letter the event.
    Permanent,
    /// Retrying may succeed.
    Transient,
}

/// A downstream publisher or scan consumer rejected its input.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// The destination is unreachable.
    #[error("Publisher unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while processing one event.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The event could not be parsed or normalized.
    #[error(transparent)]
    Malformed(#[from] MalformedEvent),

    /// An error occurred in the record store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The derived event or scan result could not be delivered.
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// A change event carried neither a before nor an after image.
    #[error("Change event '{event_type}' carries no record image")]
    MissingImage { event_type: String },

    /// Processing exceeded the per-event time budget.
    #[error("Event '{event_type}' exceeded its {budget:?} budget")]
    Timeout { event_type: String, budget: Duration },
}

impl PipelineError {
    /// Classifies the error for the transport's retry policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::Malformed(_) | PipelineError::MissingImage { .. } => {
                ErrorClass::Permanent
            }
            PipelineError::Store(e) if e.is_transient() => ErrorClass::Transient,
            PipelineError::Store(_) => ErrorClass::Permanent,
            PipelineError::Publish(_) | PipelineError::Timeout { .. } => ErrorClass::Transient,
        }
    }

    /// Returns true if the event may be retried.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// The pipeline configuration could not be built.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A rule pattern is not a valid regular expression.
    #[error("Invalid rule pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The status table is not a bijection.
    #[error(transparent)]
    StatusTable(#[from] TableError),
}

/// Convenience type alias for pipeline results.
pub type Result<T> = std::result::Result<T, PipelineError>;
