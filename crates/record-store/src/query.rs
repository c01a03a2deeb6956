use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::attr;
use crate::{Record, RecordKey, Result, StoreError};

/// Secondary index a listing query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Index {
    /// Keyed by record discriminator.
    Gsi1,
    /// Keyed by business category.
    Gsi2,
}

impl Index {
    /// Returns the attribute this index is keyed by.
    pub fn key_name(&self) -> &'static str {
        match self {
            Index::Gsi1 => attr::DISCRIMINATOR,
            Index::Gsi2 => "category",
        }
    }
}

/// Builder for listing queries against a secondary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub index: Index,
    pub key_value: String,
    /// Opaque cursor returned by the previous page.
    pub cursor: Option<String>,
    pub limit: Option<usize>,
    pub sort_by: String,
    /// Case-insensitive term matched against string business fields.
    pub search: Option<String>,
}

impl QueryRequest {
    /// Creates a query for every record whose `index` key equals `key_value`.
    pub fn on(index: Index, key_value: impl Into<String>) -> Self {
        Self {
            index,
            key_value: key_value.into(),
            cursor: None,
            limit: None,
            sort_by: attr::TIMESTAMP.to_string(),
            search: None,
        }
    }

    /// Returns the name of the key attribute this query filters on.
    pub fn key_name(&self) -> &'static str {
        self.index.key_name()
    }

    /// Continues from a previous page.
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Limits the number of records returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sorts by the given attribute.
    pub fn sort_by(mut self, sort_by: impl Into<String>) -> Self {
        self.sort_by = sort_by.into();
        self
    }

    /// Filters to records containing `term`.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage<T = Record> {
    pub data: Vec<T>,
    /// Present when more results follow.
    pub cursor: Option<String>,
}

/// Position in a sorted result set: the sort value and key of the last
/// record returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub sort_value: Option<Value>,
    pub key: RecordKey,
}

impl Cursor {
    /// Creates the cursor pointing after `record`.
    pub fn after(record: &Record, sort_by: &str) -> Self {
        Self {
            sort_value: record.attribute(sort_by),
            key: record.key(),
        }
    }

    /// Encodes the cursor as an opaque string.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a cursor produced by [`Cursor::encode`].
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| StoreError::InvalidCursor(e.to_string()))
    }
}
