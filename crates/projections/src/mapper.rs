//! Record → public object mapping.

use common::sort_key_suffix;
use record_store::{Record, attr};
use serde_json::{Map, Value};

/// Attributes the store and pipeline manage that never leave the read path.
pub const INTERNAL_FIELDS: &[&str] = &[
    attr::PARTITION_KEY,
    attr::SORT_KEY,
    attr::DISCRIMINATOR,
    attr::DELETED,
    attr::LATCHED,
    attr::TTL,
    attr::REGION,
    "raw",
    "before",
    "after",
];

/// Where a mapped object's public `id` comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    /// The partition key. Used for roots.
    PartitionKey,
    /// The part of the sort key after the alias. Used for children.
    SortKeySuffix,
}

/// Maps one stored record to the object clients see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMapper {
    id: IdSource,
}

impl RecordMapper {
    /// Mapper for root records.
    pub const fn root() -> Self {
        Self {
            id: IdSource::PartitionKey,
        }
    }

    /// Mapper for child records.
    pub const fn child() -> Self {
        Self {
            id: IdSource::SortKeySuffix,
        }
    }

    /// Returns the id source.
    pub fn id_source(&self) -> IdSource {
        self.id
    }

    /// Business fields plus `id`, `timestamp` and `lastModifiedBy`; internal
    /// attributes are dropped.
    pub fn map(&self, record: &Record) -> Map<String, Value> {
        let mut object: Map<String, Value> = record
            .fields
            .iter()
            .filter(|(name, _)| !INTERNAL_FIELDS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        if let Some(timestamp) = record.timestamp {
            object.insert(attr::TIMESTAMP.to_string(), Value::from(timestamp));
        }
        if let Some(modified_by) = &record.last_modified_by {
            object.insert(
                attr::LAST_MODIFIED_BY.to_string(),
                Value::from(modified_by.clone()),
            );
        }

        let id = match self.id {
            IdSource::PartitionKey => Some(record.partition_key.as_str()),
            IdSource::SortKeySuffix => sort_key_suffix(&record.sort_key),
        };
        if let Some(id) = id {
            object.insert("id".to_string(), Value::from(id));
        }

        object
    }
}
