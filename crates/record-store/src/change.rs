use serde::{Deserialize, Serialize};

use crate::{Record, RecordKey};

/// What a change did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    /// Returns the lowercase name used in derived event types.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        }
    }
}

/// A confirmed mutation as delivered by the store's change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub key: RecordKey,
    pub before: Option<Record>,
    pub after: Option<Record>,
}

impl ChangeRecord {
    /// Classifies the change. A write that leaves a tombstone counts as a
    /// deletion.
    pub fn kind(&self) -> ChangeKind {
        match (&self.before, &self.after) {
            (_, None) => ChangeKind::Deleted,
            (_, Some(after)) if after.is_deleted() => ChangeKind::Deleted,
            (None, Some(_)) => ChangeKind::Created,
            (Some(_), Some(_)) => ChangeKind::Updated,
        }
    }

    /// Returns the newest available image.
    pub fn image(&self) -> Option<&Record> {
        self.after.as_ref().or(self.before.as_ref())
    }

    /// Returns the discriminator of the changed record.
    pub fn discriminator(&self) -> Option<&str> {
        self.image().map(|r| r.discriminator.as_str())
    }

    /// Returns the `<discriminator>-<kind>` event type for this change.
    pub fn event_type(&self) -> Option<String> {
        self.discriminator()
            .filter(|d| !d.is_empty())
            .map(|d| format!("{d}-{}", self.kind().as_str()))
    }
}
