use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::compare_values;
use crate::{Record, Result, StoreError};

/// A full-table scan with a filter expression.
///
/// Attribute names and values are referenced from the expression through
/// `#name` and `:value` placeholders. The expression is a conjunction of
/// comparisons joined by `AND`, e.g. `#qty <= :low AND #status = :status`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub attribute_names: BTreeMap<String, String>,
    pub attribute_values: BTreeMap<String, Value>,
    pub filter_expression: String,
}

impl ScanRequest {
    /// Creates a scan with the given filter expression.
    pub fn new(filter_expression: impl Into<String>) -> Self {
        Self {
            filter_expression: filter_expression.into(),
            ..Self::default()
        }
    }

    /// Binds a `#placeholder` to an attribute name.
    pub fn name(mut self, placeholder: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.attribute_names
            .insert(placeholder.into(), attribute.into());
        self
    }

    /// Binds a `:placeholder` to a value.
    pub fn value(mut self, placeholder: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attribute_values
            .insert(placeholder.into(), value.into());
        self
    }

    /// Parses the filter expression into a form that can be evaluated.
    pub fn compile(&self) -> Result<Filter> {
        let mut comparisons = Vec::new();

        for clause in self.filter_expression.split(" AND ") {
            let tokens: Vec<&str> = clause.split_whitespace().collect();
            let [name, op, value] = tokens.as_slice() else {
                return Err(StoreError::InvalidExpression(format!(
                    "expected '<#name> <op> <:value>', got '{}'",
                    clause.trim()
                )));
            };

            let attribute = self.attribute_names.get(*name).ok_or_else(|| {
                StoreError::InvalidExpression(format!("unbound attribute name {name}"))
            })?;
            let operand = self.attribute_values.get(*value).ok_or_else(|| {
                StoreError::InvalidExpression(format!("unbound attribute value {value}"))
            })?;

            comparisons.push(Comparison {
                attribute: attribute.clone(),
                operator: Operator::parse(op)?,
                operand: operand.clone(),
            });
        }

        Ok(Filter { comparisons })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    fn parse(token: &str) -> Result<Self> {
        Ok(match token {
            "=" => Operator::Eq,
            "<>" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            other => {
                return Err(StoreError::InvalidExpression(format!(
                    "unsupported operator '{other}'"
                )));
            }
        })
    }

    fn accepts(&self, ordering: Option<Ordering>) -> bool {
        match self {
            Operator::Ne => ordering != Some(Ordering::Equal),
            Operator::Eq => ordering == Some(Ordering::Equal),
            Operator::Lt => ordering == Some(Ordering::Less),
            Operator::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            Operator::Gt => ordering == Some(Ordering::Greater),
            Operator::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

#[derive(Debug, Clone)]
struct Comparison {
    attribute: String,
    operator: Operator,
    operand: Value,
}

/// A compiled scan filter.
#[derive(Debug, Clone)]
pub struct Filter {
    comparisons: Vec<Comparison>,
}

impl Filter {
    /// Returns true if every comparison holds for `record`. A missing
    /// attribute fails the comparison.
    pub fn matches(&self, record: &Record) -> bool {
        self.comparisons.iter().all(|c| {
            record
                .attribute(&c.attribute)
                .is_some_and(|v| c.operator.accepts(compare_values(&v, &c.operand)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordKey;
    use serde_json::json;

    fn product(stock: i64, status: &str) -> Record {
        Record::new(RecordKey::root("p1", "product"), "product")
            .with_timestamp(1)
            .with_field("stockQuantity", json!(stock))
            .with_field("status", json!(status))
    }

    fn low_stock_scan() -> ScanRequest {
        ScanRequest::new("#qty <= :low AND #status = :status AND #d = :d")
            .name("#qty", "stockQuantity")
            .name("#status", "status")
            .name("#d", "discriminator")
            .value(":low", 10)
            .value(":status", "ACTIVE")
            .value(":d", "product")
    }

    #[test]
    fn conjunction_matches_all_clauses() {
        let filter = low_stock_scan().compile().unwrap();
        assert!(filter.matches(&product(3, "ACTIVE")));
        assert!(filter.matches(&product(10, "ACTIVE")));
        assert!(!filter.matches(&product(11, "ACTIVE")));
        assert!(!filter.matches(&product(3, "DRAFT")));
    }

    #[test]
    fn missing_attribute_fails_comparison() {
        let filter = low_stock_scan().compile().unwrap();
        let record = Record::new(RecordKey::root("p1", "product"), "product");
        assert!(!filter.matches(&record));
    }

    #[test]
    fn unbound_placeholder_is_rejected() {
        let scan = ScanRequest::new("#a = :missing").name("#a", "status");
        assert!(matches!(
            scan.compile(),
            Err(StoreError::InvalidExpression(_))
        ));
    }

    #[test]
    fn malformed_clause_is_rejected() {
        let scan = ScanRequest::new("#a BETWEEN :x").name("#a", "status");
        assert!(scan.compile().is_err());
    }

    #[test]
    fn not_equal_matches_other_types() {
        let scan = ScanRequest::new("#s <> :s")
            .name("#s", "status")
            .value(":s", 1);
        let filter = scan.compile().unwrap();
        assert!(filter.matches(&product(1, "ACTIVE")));
    }
}
