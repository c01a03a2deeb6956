use serde::{Deserialize, Serialize};

/// Separator between a child alias and the child id inside a sort key.
pub const SORT_KEY_SEPARATOR: char = '|';

/// Primary key of a stored record.
///
/// The pair (partition key, sort key) uniquely identifies a record. Root
/// records use their discriminator as the sort key; child records use
/// `"<alias>|<childId>"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    pub partition_key: String,
    pub sort_key: String,
}

impl RecordKey {
    /// Creates a key from its two parts.
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }

    /// Creates the key of a root record, whose sort key is its discriminator.
    pub fn root(partition_key: impl Into<String>, discriminator: &str) -> Self {
        Self::new(partition_key, discriminator)
    }

    /// Creates the key of a child record stored under `alias`.
    pub fn child(partition_key: impl Into<String>, alias: &str, child_id: &str) -> Self {
        Self::new(
            partition_key,
            format!("{alias}{SORT_KEY_SEPARATOR}{child_id}"),
        )
    }

    /// Returns the child id portion of the sort key, if this is a child key.
    pub fn child_id(&self) -> Option<&str> {
        sort_key_suffix(&self.sort_key)
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.partition_key, self.sort_key)
    }
}

/// Returns the part of a sort key after the first separator.
pub fn sort_key_suffix(sort_key: &str) -> Option<&str> {
    sort_key
        .split_once(SORT_KEY_SEPARATOR)
        .map(|(_, suffix)| suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_key_joins_alias_and_id() {
        let key = RecordKey::child("p1", "variants", "v1");
        assert_eq!(key.sort_key, "variants|v1");
        assert_eq!(key.child_id(), Some("v1"));
    }

    #[test]
    fn root_key_has_no_child_id() {
        let key = RecordKey::root("p1", "product");
        assert_eq!(key.sort_key, "product");
        assert_eq!(key.child_id(), None);
    }

    #[test]
    fn suffix_keeps_later_separators() {
        assert_eq!(sort_key_suffix("variants|a|b"), Some("a|b"));
    }

    #[test]
    fn record_key_serializes_camel_case() {
        let key = RecordKey::root("p1", "product");
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json["partitionKey"], "p1");
        assert_eq!(json["sortKey"], "product");
    }
}
