//! Aggregate reconstruction from a partition's records.

use domain::{PRODUCT_DISCRIMINATOR, VARIANT_ALIAS, VARIANT_CARDINALITY, VARIANT_DISCRIMINATOR};
use record_store::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mapper::RecordMapper;

/// A child record type folded into the aggregate as a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSpec {
    pub discriminator: String,
    pub alias: String,
    /// Maximum number of entries listed.
    pub cardinality: usize,
}

impl ChildSpec {
    pub fn new(
        discriminator: impl Into<String>,
        alias: impl Into<String>,
        cardinality: usize,
    ) -> Self {
        Self {
            discriminator: discriminator.into(),
            alias: alias.into(),
            cardinality,
        }
    }
}

/// A denormalized view of a root record and its children.
///
/// Built at read time and never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Aggregate(Map<String, Value>);

impl Aggregate {
    /// An aggregate with no fields.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a top-level field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns the list stored under `alias`, or an empty slice.
    pub fn children(&self, alias: &str) -> &[Value] {
        self.0
            .get(alias)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Aggregate> for Value {
    fn from(aggregate: Aggregate) -> Self {
        Value::Object(aggregate.0)
    }
}

/// Folds the records of one partition into an [`Aggregate`].
///
/// The root discriminator contributes top-level fields. Each configured
/// child discriminator becomes a list under its alias, holding the first
/// `cardinality` live children in the order received. Unknown discriminators
/// are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateMapper {
    root: String,
    children: Vec<ChildSpec>,
}

impl AggregateMapper {
    /// Creates a mapper with no child types.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            children: Vec::new(),
        }
    }

    /// Adds a child type.
    pub fn with_child(mut self, child: ChildSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Mapper for products and their variants.
    pub fn catalog() -> Self {
        Self::new(PRODUCT_DISCRIMINATOR).with_child(ChildSpec::new(
            VARIANT_DISCRIMINATOR,
            VARIANT_ALIAS,
            VARIANT_CARDINALITY,
        ))
    }

    /// Returns the root discriminator.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Returns the configured child types.
    pub fn children(&self) -> &[ChildSpec] {
        &self.children
    }

    /// Builds the aggregate. Missing children yield empty lists.
    pub fn map(&self, records: &[Record]) -> Aggregate {
        let mut object = records
            .iter()
            .find(|r| r.discriminator == self.root)
            .map(|root| RecordMapper::root().map(root))
            .unwrap_or_default();

        for child in &self.children {
            let entries: Vec<Value> = records
                .iter()
                .filter(|r| r.discriminator == child.discriminator && !r.is_deleted())
                .take(child.cardinality)
                .map(|r| Value::Object(RecordMapper::child().map(r)))
                .collect();

            object.insert(child.alias.clone(), Value::Array(entries));
        }

        Aggregate(object)
    }
}
