use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{
    ChangeRecord, ConditionalUpdate, QueryPage, QueryRequest, Record, RecordKey, Result,
    ScanRequest, UpdateOutcome,
};

/// A stream of confirmed changes.
pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeRecord> + Send>>;

/// Core trait for current-state store implementations.
///
/// All implementations must be thread-safe (Send + Sync). Records whose TTL
/// has passed are invisible to every read.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Applies a conditional update to a single record.
    ///
    /// A failed precondition returns `UpdateOutcome::ConditionFailed`, not an
    /// error.
    async fn update(&self, update: ConditionalUpdate) -> Result<UpdateOutcome>;

    /// Retrieves every record sharing a partition key, ordered by sort key.
    async fn get(&self, partition_key: &str) -> Result<Vec<Record>>;

    /// Retrieves a single record.
    async fn get_record(&self, key: &RecordKey) -> Result<Option<Record>>;

    /// Runs a paginated query against a secondary index.
    async fn query(&self, request: QueryRequest) -> Result<QueryPage>;

    /// Scans the whole store with a filter expression.
    async fn scan(&self, request: &ScanRequest) -> Result<Vec<Record>>;
}

/// Extension trait providing convenience methods for record stores.
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    /// Applies several updates in order. Each update is independent; there is
    /// no cross-record atomicity.
    async fn batch_update(&self, updates: Vec<ConditionalUpdate>) -> Result<Vec<UpdateOutcome>> {
        let mut outcomes = Vec::with_capacity(updates.len());
        for update in updates {
            outcomes.push(self.update(update).await?);
        }
        Ok(outcomes)
    }

    /// Checks if any record exists for a partition key.
    async fn partition_exists(&self, partition_key: &str) -> Result<bool> {
        Ok(!self.get(partition_key).await?.is_empty())
    }
}

// Blanket implementation for all RecordStore implementations
impl<T: RecordStore + ?Sized> RecordStoreExt for T {}

/// Source of confirmed changes, the store's change-data-capture stream.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Takes every change recorded since the previous call, oldest first.
    async fn take_changes(&self) -> ChangeStream;
}
