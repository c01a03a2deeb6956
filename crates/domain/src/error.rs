//! Domain error types.

use record_store::StoreError;
use thiserror::Error;

use crate::status::ProductStatus;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the record store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A direct write was missing required fields. Nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A direct write carried a field of the wrong shape. Nothing was written.
    #[error("{entity} field '{field}' must be {expected}")]
    InvalidField {
        entity: &'static str,
        field: &'static str,
        expected: &'static str,
    },

    /// An inbound event could not be normalized.
    #[error(transparent)]
    Malformed(#[from] MalformedEvent),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A direct save was rejected because required business fields are missing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity} is missing required fields: {}", .missing.join(", "))]
pub struct ValidationError {
    pub entity: &'static str,
    pub missing: Vec<&'static str>,
}

/// An inbound event body that cannot be parsed or normalized.
#[derive(Debug, Error)]
pub enum MalformedEvent {
    /// The body is not valid JSON or has the wrong shape.
    #[error("Event body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Neither `type` nor `eventType` is present.
    #[error("Event has no type")]
    MissingType,

    /// No timestamp is present.
    #[error("Event has no timestamp")]
    MissingTimestamp,

    /// The timestamp is neither epoch millis nor a parseable date.
    #[error("Invalid event timestamp: {0}")]
    InvalidTimestamp(String),

    /// The event names no entity, neither at event level nor in its payload.
    #[error("Event '{event_type}' does not identify an entity")]
    MissingEntityId { event_type: String },
}

/// The status↔event-type table was built from a non-injective pair list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// The same status was mapped twice.
    #[error("Status {0} is mapped to more than one event type")]
    DuplicateStatus(ProductStatus),

    /// The same event type was mapped twice.
    #[error("Event type '{0}' is mapped to more than one status")]
    DuplicateEventType(String),
}
