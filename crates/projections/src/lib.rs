//! Read side of the catalog.
//!
//! This crate provides:
//! - [`RecordMapper`] for turning stored records into public objects
//! - [`AggregateMapper`] for folding a partition into one [`Aggregate`]
//! - [`CatalogReader`] for product listings and lookups

pub mod aggregate;
pub mod error;
pub mod mapper;
pub mod reader;

pub use aggregate::{Aggregate, AggregateMapper, ChildSpec};
pub use error::{ProjectionError, Result};
pub use mapper::{INTERNAL_FIELDS, IdSource, RecordMapper};
pub use reader::{CatalogReader, ListQuery};
