//! Product status and its bijection with event-type tokens.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TableError;

/// Lifecycle status of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Draft,
    Active,
    Inactive,
    OutOfStock,
    Discontinued,
}

impl ProductStatus {
    /// Every status, in declaration order.
    pub const ALL: [ProductStatus; 5] = [
        ProductStatus::Draft,
        ProductStatus::Active,
        ProductStatus::Inactive,
        ProductStatus::OutOfStock,
        ProductStatus::Discontinued,
    ];

    /// Returns the stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Draft => "DRAFT",
            ProductStatus::Active => "ACTIVE",
            ProductStatus::Inactive => "INACTIVE",
            ProductStatus::OutOfStock => "OUT_OF_STOCK",
            ProductStatus::Discontinued => "DISCONTINUED",
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown product status '{s}'"))
    }
}

/// Canonical (status, event type) pairs for products.
pub const PRODUCT_STATUS_EVENTS: &[(ProductStatus, &str)] = &[
    (ProductStatus::Draft, "product-draft"),
    (ProductStatus::Active, "product-published"),
    (ProductStatus::Inactive, "product-deactivated"),
    (ProductStatus::OutOfStock, "product-out-of-stock"),
    (ProductStatus::Discontinued, "product-discontinued"),
];

/// Two-way lookup between statuses and event types.
///
/// Built from a single list of pairs; construction fails if the list maps a
/// status or an event type twice, so both directions are always consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEventTable {
    by_status: HashMap<ProductStatus, String>,
    by_event_type: HashMap<String, ProductStatus>,
}

impl StatusEventTable {
    /// Builds a table, rejecting duplicate statuses or event types.
    pub fn new(pairs: &[(ProductStatus, &str)]) -> Result<Self, TableError> {
        let mut by_status = HashMap::with_capacity(pairs.len());
        let mut by_event_type = HashMap::with_capacity(pairs.len());

        for (status, event_type) in pairs {
            if by_status.insert(*status, event_type.to_string()).is_some() {
                return Err(TableError::DuplicateStatus(*status));
            }
            if by_event_type
                .insert(event_type.to_string(), *status)
                .is_some()
            {
                return Err(TableError::DuplicateEventType(event_type.to_string()));
            }
        }

        Ok(Self {
            by_status,
            by_event_type,
        })
    }

    /// Builds the product catalog table.
    pub fn catalog() -> Result<Self, TableError> {
        Self::new(PRODUCT_STATUS_EVENTS)
    }

    /// Returns the event type announcing `status`.
    pub fn event_type_for(&self, status: ProductStatus) -> Option<&str> {
        self.by_status.get(&status).map(String::as_str)
    }

    /// Returns the status an event type sets.
    pub fn status_for(&self, event_type: &str) -> Option<ProductStatus> {
        self.by_event_type.get(event_type).copied()
    }

    /// Returns the event type for a stored status string, if it is known.
    pub fn event_type_for_stored(&self, status: &str) -> Option<&str> {
        status
            .parse::<ProductStatus>()
            .ok()
            .and_then(|s| self.event_type_for(s))
    }

    /// Returns the number of pairs.
    pub fn len(&self) -> usize {
        self.by_status.len()
    }

    /// Returns true if the table has no pairs.
    pub fn is_empty(&self) -> bool {
        self.by_status.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_table_is_bijective() {
        let table = StatusEventTable::catalog().unwrap();
        assert_eq!(table.len(), ProductStatus::ALL.len());

        for status in ProductStatus::ALL {
            let event_type = table.event_type_for(status).unwrap();
            assert_eq!(table.status_for(event_type), Some(status));
        }
    }

    #[test]
    fn published_maps_to_active() {
        let table = StatusEventTable::catalog().unwrap();
        assert_eq!(
            table.status_for("product-published"),
            Some(ProductStatus::Active)
        );
        assert_eq!(table.event_type_for_stored("ACTIVE"), Some("product-published"));
    }

    #[test]
    fn unknown_tokens_are_absent() {
        let table = StatusEventTable::catalog().unwrap();
        assert_eq!(table.status_for("product-deleted"), None);
        assert_eq!(table.status_for("product-price-updated"), None);
        assert_eq!(table.event_type_for_stored("active"), None);
    }

    #[test]
    fn duplicate_event_type_is_rejected() {
        let result = StatusEventTable::new(&[
            (ProductStatus::Draft, "product-draft"),
            (ProductStatus::Active, "product-draft"),
        ]);
        assert_eq!(
            result,
            Err(TableError::DuplicateEventType("product-draft".to_string()))
        );
    }

    #[test]
    fn duplicate_status_is_rejected() {
        let result = StatusEventTable::new(&[
            (ProductStatus::Draft, "product-draft"),
            (ProductStatus::Draft, "product-drafted"),
        ]);
        assert_eq!(result, Err(TableError::DuplicateStatus(ProductStatus::Draft)));
    }

    #[test]
    fn status_parses_and_serializes_in_screaming_case() {
        assert_eq!("OUT_OF_STOCK".parse(), Ok(ProductStatus::OutOfStock));
        assert!("out_of_stock".parse::<ProductStatus>().is_err());
        assert_eq!(
            serde_json::to_value(ProductStatus::OutOfStock).unwrap(),
            "OUT_OF_STOCK"
        );
    }
}
