//! Catalog domain layer.
//!
//! This crate provides:
//! - The product status table and its bijection with event types
//! - Retention windows and the monotonic-timestamp write condition
//! - Ingress normalization of inbound change events
//! - Direct product and variant writes with required-field validation

pub mod error;
pub mod event;
pub mod product;
pub mod retention;
pub mod status;

pub use error::{DomainError, MalformedEvent, TableError, ValidationError};
pub use event::{ChangeEvent, RawEvent, business_fields, parse_timestamp};
pub use product::{
    Claims, DEFAULT_CATEGORY, PRODUCT_DELETED, PRODUCT_DISCRIMINATOR, ProductService,
    VARIANT_ALIAS, VARIANT_CARDINALITY, VARIANT_DISCRIMINATOR, validate_product, validate_variant,
};
pub use retention::{RetentionPolicy, timestamp_condition};
pub use status::{PRODUCT_STATUS_EVENTS, ProductStatus, StatusEventTable};
