use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::record::attr;
use crate::{ChangeRecord, Record, RecordKey};

/// A single attribute mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateOp {
    /// Overwrites the attribute. `null` is stored as null.
    Set(Value),
    /// Atomically adds to a numeric attribute, treating a missing one as zero.
    Add(i64),
}

/// Precondition evaluated against the stored record before a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    /// The write always applies.
    #[default]
    Always,
    /// The stored timestamp is absent or strictly less than the given one.
    TimestampBefore(i64),
    /// A record exists and its timestamp equals the given one.
    TimestampEquals(i64),
}

impl Condition {
    /// Returns true if the condition holds for the currently stored record.
    pub fn holds(&self, stored: Option<&Record>) -> bool {
        match self {
            Condition::Always => true,
            Condition::TimestampBefore(incoming) => stored
                .and_then(|r| r.timestamp)
                .is_none_or(|current| current < *incoming),
            Condition::TimestampEquals(expected) => {
                stored.and_then(|r| r.timestamp) == Some(*expected)
            }
        }
    }
}

/// An update request keyed by (partition key, sort key) with a precondition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalUpdate {
    pub key: RecordKey,
    pub set_fields: BTreeMap<String, UpdateOp>,
    pub condition: Condition,
}

impl ConditionalUpdate {
    /// Creates an unconditional update with no mutations.
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            set_fields: BTreeMap::new(),
            condition: Condition::Always,
        }
    }

    /// Sets an attribute to a value.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_fields.insert(name.into(), UpdateOp::Set(value.into()));
        self
    }

    /// Sets an attribute only when a value is present.
    pub fn set_opt(self, name: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.set(name, value),
            None => self,
        }
    }

    /// Sets every entry of a JSON object.
    pub fn set_all(mut self, fields: Map<String, Value>) -> Self {
        for (name, value) in fields {
            self.set_fields.insert(name, UpdateOp::Set(value));
        }
        self
    }

    /// Adds to a numeric attribute.
    pub fn add(mut self, name: impl Into<String>, delta: i64) -> Self {
        self.set_fields.insert(name.into(), UpdateOp::Add(delta));
        self
    }

    /// Sets the precondition.
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// Returns the value an attribute will be set to, if it is a plain set.
    pub fn value_of(&self, name: &str) -> Option<&Value> {
        match self.set_fields.get(name) {
            Some(UpdateOp::Set(value)) => Some(value),
            _ => None,
        }
    }

    /// Returns the timestamp this update writes, if any.
    pub fn timestamp(&self) -> Option<i64> {
        self.value_of(attr::TIMESTAMP).and_then(Value::as_i64)
    }

    /// Produces the record that results from applying this update on top of
    /// `current`.
    pub fn apply(&self, current: Option<&Record>) -> serde_json::Result<Record> {
        let mut object = match current {
            Some(record) => record.clone().into_object()?,
            None => Map::new(),
        };

        for (name, op) in &self.set_fields {
            match op {
                UpdateOp::Set(value) => {
                    object.insert(name.clone(), value.clone());
                }
                UpdateOp::Add(delta) => {
                    let sum = add_number(object.get(name), *delta);
                    object.insert(name.clone(), sum);
                }
            }
        }

        object.insert(
            attr::PARTITION_KEY.to_string(),
            Value::from(self.key.partition_key.clone()),
        );
        object.insert(
            attr::SORT_KEY.to_string(),
            Value::from(self.key.sort_key.clone()),
        );

        Record::from_object(object)
    }
}

fn add_number(current: Option<&Value>, delta: i64) -> Value {
    match current {
        Some(Value::Number(n)) if n.is_i64() => {
            Value::from(n.as_i64().unwrap_or_default().saturating_add(delta))
        }
        Some(Value::Number(n)) => Value::from(n.as_f64().unwrap_or_default() + delta as f64),
        _ => Value::from(delta),
    }
}

/// The result of a conditional write.
///
/// A failed precondition is not an error: a stale or duplicate write is a
/// successful no-op.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The write was applied; carries the before/after images.
    Applied(ChangeRecord),
    /// The precondition rejected the write and nothing changed.
    ConditionFailed {
        key: RecordKey,
        stored_timestamp: Option<i64>,
    },
}

impl UpdateOutcome {
    /// Returns true if the write changed the store.
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }
}

/// Error returned when an update request is structurally invalid.
#[derive(Debug, Clone)]
pub struct UpdateValidationError {
    pub message: String,
}

impl std::fmt::Display for UpdateValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Update validation error: {}", self.message)
    }
}

impl std::error::Error for UpdateValidationError {}

/// Validates an update before it reaches the store.
pub fn validate_update(update: &ConditionalUpdate) -> Result<(), UpdateValidationError> {
    if update.key.partition_key.is_empty() || update.key.sort_key.is_empty() {
        return Err(UpdateValidationError {
            message: "partition key and sort key must not be empty".to_string(),
        });
    }

    for name in [attr::PARTITION_KEY, attr::SORT_KEY] {
        if update.set_fields.contains_key(name) {
            return Err(UpdateValidationError {
                message: format!("key attribute '{name}' cannot be updated"),
            });
        }
    }

    Ok(())
}
