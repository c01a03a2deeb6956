use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{SharedClock, SystemClock};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::query::Cursor;
use crate::record::total_order;
use crate::update::validate_update;
use crate::{
    ChangeFeed, ChangeRecord, ChangeStream, ConditionalUpdate, QueryPage, QueryRequest, Record,
    RecordKey, RecordStore, Result, ScanRequest, StoreError, UpdateOutcome,
};

/// In-memory record store implementation for testing and local runs.
///
/// Behaves like the production store as far as the pipeline can observe:
/// conditional writes, TTL expiry against an injectable clock, secondary-index
/// queries, filtered scans and a change feed.
#[derive(Clone)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<BTreeMap<RecordKey, Record>>>,
    changes: Arc<RwLock<Vec<ChangeRecord>>>,
    clock: SharedClock,
    unavailable: Arc<AtomicBool>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemoryRecordStore {
    /// Creates a new empty store using the system clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty store that evaluates TTLs against `clock`.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
            changes: Arc::new(RwLock::new(Vec::new())),
            clock,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the number of stored records, expired ones included.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns the number of changes not yet taken from the feed.
    pub async fn pending_changes(&self) -> usize {
        self.changes.read().await.len()
    }

    /// Clears all records and pending changes.
    pub async fn clear(&self) {
        self.records.write().await.clear();
        self.changes.write().await.clear();
    }

    /// Simulates an outage: every operation fails with a transient error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn live<'a>(&self, record: &'a Record, now_secs: i64) -> Option<&'a Record> {
        (!record.is_expired(now_secs)).then_some(record)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    #[tracing::instrument(skip(self, update), fields(key = %update.key))]
    async fn update(&self, update: ConditionalUpdate) -> Result<UpdateOutcome> {
        self.check_available()?;
        validate_update(&update).map_err(|e| StoreError::InvalidUpdate {
            key: update.key.clone(),
            message: e.message,
        })?;

        let now = self.clock.now_secs();
        let mut records = self.records.write().await;

        let before = records
            .get(&update.key)
            .and_then(|r| self.live(r, now))
            .cloned();

        if !update.condition.holds(before.as_ref()) {
            tracing::debug!(condition = ?update.condition, "conditional write rejected");
            metrics::counter!("store_condition_failures_total").increment(1);
            return Ok(UpdateOutcome::ConditionFailed {
                key: update.key,
                stored_timestamp: before.and_then(|r| r.timestamp),
            });
        }

        let after = update.apply(before.as_ref())?;
        records.insert(update.key.clone(), after.clone());

        let change = ChangeRecord {
            key: update.key,
            before,
            after: Some(after),
        };
        // Pushed under the records lock so the feed preserves write order.
        self.changes.write().await.push(change.clone());
        drop(records);

        metrics::counter!("store_updates_total").increment(1);
        Ok(UpdateOutcome::Applied(change))
    }

    async fn get(&self, partition_key: &str) -> Result<Vec<Record>> {
        self.check_available()?;
        let now = self.clock.now_secs();
        let records = self.records.read().await;

        Ok(records
            .range(RecordKey::new(partition_key, "")..)
            .take_while(|(key, _)| key.partition_key == partition_key)
            .filter_map(|(_, record)| self.live(record, now))
            .cloned()
            .collect())
    }

    async fn get_record(&self, key: &RecordKey) -> Result<Option<Record>> {
        self.check_available()?;
        let now = self.clock.now_secs();
        let records = self.records.read().await;
        Ok(records.get(key).and_then(|r| self.live(r, now)).cloned())
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryPage> {
        self.check_available()?;
        let now = self.clock.now_secs();
        let key_value = Value::from(request.key_value.clone());
        let search = request.search.as_ref().map(|s| s.to_lowercase());

        let records = self.records.read().await;
        let mut matched: Vec<&Record> = records
            .values()
            .filter_map(|r| self.live(r, now))
            .filter(|r| r.attribute(request.key_name()).as_ref() == Some(&key_value))
            .filter(|r| match &search {
                Some(term) => r.fields.values().any(|v| {
                    v.as_str()
                        .is_some_and(|s| s.to_lowercase().contains(term.as_str()))
                }),
                None => true,
            })
            .collect();

        let sort_by = request.sort_by.as_str();
        matched.sort_by(|a, b| {
            total_order(a.attribute(sort_by).as_ref(), b.attribute(sort_by).as_ref())
                .then_with(|| a.key().cmp(&b.key()))
        });

        let start = match &request.cursor {
            Some(raw) => {
                let cursor = Cursor::decode(raw)?;
                matched
                    .iter()
                    .position(|r| {
                        total_order(r.attribute(sort_by).as_ref(), cursor.sort_value.as_ref())
                            .then_with(|| r.key().cmp(&cursor.key))
                            .is_gt()
                    })
                    .unwrap_or(matched.len())
            }
            None => 0,
        };

        let remaining = &matched[start..];
        let limit = request.limit.unwrap_or(remaining.len());
        let data: Vec<Record> = remaining.iter().take(limit).map(|r| (*r).clone()).collect();

        let cursor = if remaining.len() > limit {
            match data.last() {
                Some(last) => Some(Cursor::after(last, sort_by).encode()?),
                None => None,
            }
        } else {
            None
        };

        Ok(QueryPage { data, cursor })
    }

    async fn scan(&self, request: &ScanRequest) -> Result<Vec<Record>> {
        self.check_available()?;
        let filter = request.compile()?;
        let now = self.clock.now_secs();
        let records = self.records.read().await;

        Ok(records
            .values()
            .filter_map(|r| self.live(r, now))
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ChangeFeed for InMemoryRecordStore {
    async fn take_changes(&self) -> ChangeStream {
        use futures_util::stream;

        let changes = std::mem::take(&mut *self.changes.write().await);
        Box::pin(stream::iter(changes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Condition, Index, RecordStoreExt};
    use common::ManualClock;
    use serde_json::json;

    fn product_update(id: &str, timestamp: i64) -> ConditionalUpdate {
        ConditionalUpdate::new(RecordKey::root(id, "product"))
            .set("discriminator", "product")
            .set("timestamp", timestamp)
            .set("name", format!("Product {id}"))
            .condition(Condition::TimestampBefore(timestamp))
    }

    #[tokio::test]
    async fn update_creates_record_and_records_change() {
        let store = InMemoryRecordStore::new();

        let outcome = store.update(product_update("p1", 1000)).await.unwrap();
        assert!(outcome.is_applied());

        let record = store
            .get_record(&RecordKey::root("p1", "product"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.timestamp, Some(1000));
        assert_eq!(store.pending_changes().await, 1);
    }

    #[tokio::test]
    async fn stale_write_is_a_condition_failure() {
        let store = InMemoryRecordStore::new();
        store.update(product_update("p1", 2000)).await.unwrap();

        let outcome = store.update(product_update("p1", 1000)).await.unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome::ConditionFailed {
                key: RecordKey::root("p1", "product"),
                stored_timestamp: Some(2000),
            }
        );

        let duplicate = store.update(product_update("p1", 2000)).await.unwrap();
        assert!(!duplicate.is_applied());
        assert_eq!(store.pending_changes().await, 1);
    }

    #[tokio::test]
    async fn get_returns_only_the_partition() {
        let store = InMemoryRecordStore::new();
        store.update(product_update("p1", 1)).await.unwrap();
        store.update(product_update("p2", 1)).await.unwrap();
        store
            .update(
                ConditionalUpdate::new(RecordKey::child("p1", "variants", "v1"))
                    .set("discriminator", "product-variant"),
            )
            .await
            .unwrap();

        let records = store.get("p1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.partition_key == "p1"));
    }

    #[tokio::test]
    async fn expired_records_are_invisible() {
        let clock = ManualClock::new(0);
        let store = InMemoryRecordStore::with_clock(Arc::new(clock.clone()));
        store
            .update(product_update("p1", 1).set("ttl", 60))
            .await
            .unwrap();

        assert!(store.partition_exists("p1").await.unwrap());

        clock.set(60_000);
        assert!(!store.partition_exists("p1").await.unwrap());
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn query_paginates_in_sort_order() {
        let store = InMemoryRecordStore::new();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            store.update(product_update(id, 10 - i as i64)).await.unwrap();
        }

        let first = store
            .query(QueryRequest::on(Index::Gsi1, "product").limit(2))
            .await
            .unwrap();
        let ids: Vec<_> = first.data.iter().map(|r| r.partition_key.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        let cursor = first.cursor.expect("second page");

        let second = store
            .query(QueryRequest::on(Index::Gsi1, "product").limit(2).cursor(cursor))
            .await
            .unwrap();
        assert_eq!(second.data.len(), 1);
        assert_eq!(second.data[0].partition_key, "a");
        assert!(second.cursor.is_none());
    }

    #[tokio::test]
    async fn query_by_category_with_search() {
        let store = InMemoryRecordStore::new();
        store
            .update(product_update("p1", 1).set("category", "tools"))
            .await
            .unwrap();
        store
            .update(product_update("p2", 2).set("category", "garden"))
            .await
            .unwrap();

        let page = store
            .query(QueryRequest::on(Index::Gsi2, "tools").search("PRODUCT P1"))
            .await
            .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].field("category"), Some(&json!("tools")));

        let none = store
            .query(QueryRequest::on(Index::Gsi2, "tools").search("p2"))
            .await
            .unwrap();
        assert!(none.data.is_empty());
    }

    #[tokio::test]
    async fn scan_applies_filter() {
        let store = InMemoryRecordStore::new();
        store
            .update(product_update("p1", 1).set("stockQuantity", 2))
            .await
            .unwrap();
        store
            .update(product_update("p2", 1).set("stockQuantity", 50))
            .await
            .unwrap();

        let scan = ScanRequest::new("#q <= :low")
            .name("#q", "stockQuantity")
            .value(":low", 10);
        let rows = store.scan(&scan).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].partition_key, "p1");
    }

    #[tokio::test]
    async fn change_feed_drains_in_write_order() {
        use futures_util::StreamExt;

        let store = InMemoryRecordStore::new();
        store.update(product_update("p1", 1)).await.unwrap();
        store.update(product_update("p1", 2)).await.unwrap();

        let changes: Vec<_> = store.take_changes().await.collect().await;
        assert_eq!(changes.len(), 2);
        assert!(changes[0].before.is_none());
        assert_eq!(changes[1].before.as_ref().and_then(|r| r.timestamp), Some(1));
        assert_eq!(store.pending_changes().await, 0);
    }

    #[tokio::test]
    async fn unavailable_store_fails_transiently() {
        let store = InMemoryRecordStore::new();
        store.set_unavailable(true);

        let err = store.get("p1").await.unwrap_err();
        assert!(err.is_transient());

        store.set_unavailable(false);
        assert!(store.get("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_update_applies_each() {
        let store = InMemoryRecordStore::new();
        let outcomes = store
            .batch_update(vec![product_update("p1", 1), product_update("p2", 1)])
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(UpdateOutcome::is_applied));
    }
}
