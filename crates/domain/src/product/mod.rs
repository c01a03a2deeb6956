//! Products and their variants.

mod service;

pub use service::{Claims, ProductService, validate_product, validate_variant};

/// Discriminator and root sort key of a product record.
pub const PRODUCT_DISCRIMINATOR: &str = "product";

/// Discriminator of a variant record.
pub const VARIANT_DISCRIMINATOR: &str = "product-variant";

/// Alias variants are stored and listed under.
pub const VARIANT_ALIAS: &str = "variants";

/// Maximum number of variants listed in a product aggregate.
pub const VARIANT_CARDINALITY: usize = 999;

/// Event type that tombstones a product.
pub const PRODUCT_DELETED: &str = "product-deleted";

/// Category assigned when a saved product names none.
pub const DEFAULT_CATEGORY: &str = "general";
