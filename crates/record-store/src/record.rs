use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::RecordKey;

/// Attribute names the store and pipeline manage themselves.
pub mod attr {
    pub const PARTITION_KEY: &str = "partitionKey";
    pub const SORT_KEY: &str = "sortKey";
    pub const DISCRIMINATOR: &str = "discriminator";
    pub const TIMESTAMP: &str = "timestamp";
    pub const LAST_MODIFIED_BY: &str = "lastModifiedBy";
    pub const DELETED: &str = "deleted";
    pub const LATCHED: &str = "latched";
    pub const TTL: &str = "ttl";
    pub const REGION: &str = "region";
    pub const STATUS: &str = "status";
}

/// A single item in the current-state store.
///
/// Internal attributes are typed; everything else lives in `fields` and is
/// flattened into the same JSON object when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub partition_key: String,
    pub sort_key: String,
    #[serde(default)]
    pub discriminator: String,
    /// Last write time in epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
    #[serde(default)]
    pub deleted: Option<bool>,
    #[serde(default)]
    pub latched: Option<bool>,
    /// Expiry time in epoch seconds.
    #[serde(default)]
    pub ttl: Option<i64>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Creates an empty record with the given key and discriminator.
    pub fn new(key: RecordKey, discriminator: impl Into<String>) -> Self {
        Self {
            partition_key: key.partition_key,
            sort_key: key.sort_key,
            discriminator: discriminator.into(),
            timestamp: None,
            last_modified_by: None,
            deleted: None,
            latched: None,
            ttl: None,
            region: None,
            fields: Map::new(),
        }
    }

    /// Sets the timestamp.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets a business field.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Marks the record as a tombstone.
    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = Some(deleted);
        self
    }

    /// Sets the latched flag.
    pub fn with_latched(mut self, latched: bool) -> Self {
        self.latched = Some(latched);
        self
    }

    /// Sets the expiry time in epoch seconds.
    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Returns the record's primary key.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.partition_key.clone(), self.sort_key.clone())
    }

    /// Returns true if the record is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted == Some(true)
    }

    /// Returns true if the derived event for this state was already emitted.
    pub fn is_latched(&self) -> bool {
        self.latched == Some(true)
    }

    /// Returns true if the record's TTL has passed at `now_secs`.
    pub fn is_expired(&self, now_secs: i64) -> bool {
        self.ttl.is_some_and(|ttl| ttl <= now_secs)
    }

    /// Returns a business field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns the `status` business field as a string.
    pub fn status(&self) -> Option<&str> {
        self.field(attr::STATUS).and_then(Value::as_str)
    }

    /// Returns any attribute, internal or business, by its stored name.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        match name {
            attr::PARTITION_KEY => Some(Value::from(self.partition_key.clone())),
            attr::SORT_KEY => Some(Value::from(self.sort_key.clone())),
            attr::DISCRIMINATOR => Some(Value::from(self.discriminator.clone())),
            attr::TIMESTAMP => self.timestamp.map(Value::from),
            attr::LAST_MODIFIED_BY => self.last_modified_by.clone().map(Value::from),
            attr::DELETED => self.deleted.map(Value::from),
            attr::LATCHED => self.latched.map(Value::from),
            attr::TTL => self.ttl.map(Value::from),
            attr::REGION => self.region.clone().map(Value::from),
            _ => self.fields.get(name).filter(|v| !v.is_null()).cloned(),
        }
    }

    /// Converts the record into a flat JSON object.
    pub fn into_object(self) -> serde_json::Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    /// Rebuilds a record from a flat JSON object.
    pub fn from_object(map: Map<String, Value>) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(map))
    }
}

/// Compares two attribute values the way the store's conditions do.
///
/// Numbers compare numerically, strings lexically and booleans by value.
/// Values of different types are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Total order over optional attribute values, used for sorting query results.
///
/// Missing sorts first, then null, booleans, numbers, strings and anything else.
pub fn total_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(_) => 5,
        }
    }

    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or_else(|| rank(Some(a)).cmp(&rank(Some(b)))),
        _ => rank(a).cmp(&rank(b)),
    }
}
