//! Direct writes for products and variants.

use common::{RecordKey, SharedClock, SystemClock};
use record_store::{ConditionalUpdate, RecordStore, RecordStoreExt, UpdateOutcome, attr};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{DomainError, ValidationError};
use crate::event::business_fields;
use crate::retention::{RetentionPolicy, timestamp_condition};
use crate::status::ProductStatus;

use super::{DEFAULT_CATEGORY, PRODUCT_DISCRIMINATOR, VARIANT_ALIAS, VARIANT_DISCRIMINATOR};

const PRODUCT_REQUIRED: [&str; 3] = ["name", "sku", "price"];
const VARIANT_REQUIRED: [&str; 2] = ["sku", "price"];

/// Identity of the caller, recorded as `lastModifiedBy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub username: String,
}

impl Default for Claims {
    fn default() -> Self {
        Self {
            username: "system".to_string(),
        }
    }
}

/// Checks that a product carries name, sku and price.
pub fn validate_product(fields: &Map<String, Value>) -> Result<(), ValidationError> {
    require("product", fields, &PRODUCT_REQUIRED)
}

/// Checks that a variant carries sku and price.
pub fn validate_variant(fields: &Map<String, Value>) -> Result<(), ValidationError> {
    require("variant", fields, &VARIANT_REQUIRED)
}

fn require(
    entity: &'static str,
    fields: &Map<String, Value>,
    required: &[&'static str],
) -> Result<(), ValidationError> {
    let missing: Vec<&'static str> = required
        .iter()
        .copied()
        .filter(|name| is_missing(fields.get(*name)))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { entity, missing })
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn id_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Service for writing products and variants straight to the store.
///
/// Every write is stamped with the clock's current time and conditioned on
/// that time being newer than what is stored, so direct writes obey the same
/// monotonic-timestamp rule as the event path.
#[derive(Clone)]
pub struct ProductService<S: RecordStore> {
    store: S,
    clock: SharedClock,
    retention: RetentionPolicy,
    region: Option<String>,
    claims: Claims,
}

impl<S: RecordStore> ProductService<S> {
    /// Creates a service on the system clock with default retention.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            retention: RetentionPolicy::default(),
            region: None,
            claims: Claims::default(),
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the retention policy.
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Sets the region recorded on every write.
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// Sets the caller identity.
    pub fn with_claims(mut self, claims: Claims) -> Self {
        self.claims = claims;
        self
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn stamp(&self, update: ConditionalUpdate, timestamp: i64) -> ConditionalUpdate {
        update
            .set(attr::LAST_MODIFIED_BY, self.claims.username.clone())
            .set(attr::TIMESTAMP, timestamp)
            .set(attr::LATCHED, Value::Null)
            .set_opt(attr::REGION, self.region.clone())
            .condition(timestamp_condition(timestamp))
    }

    fn variant_update(
        &self,
        key: RecordKey,
        fields: Map<String, Value>,
        timestamp: i64,
    ) -> ConditionalUpdate {
        let status = fields
            .get(attr::STATUS)
            .cloned()
            .unwrap_or_else(|| ProductStatus::Active.as_str().into());
        let stock = fields
            .get("stockQuantity")
            .cloned()
            .unwrap_or_else(|| Value::from(0));

        let update = ConditionalUpdate::new(key)
            .set_all(business_fields(&fields))
            .set(attr::DISCRIMINATOR, VARIANT_DISCRIMINATOR)
            .set(attr::DELETED, Value::Null)
            .set(attr::TTL, self.retention.live_ttl(timestamp))
            .set(attr::STATUS, status)
            .set("stockQuantity", stock);

        self.stamp(update, timestamp)
    }

    /// Saves a product and, optionally, its variants.
    ///
    /// Variants listed in `input.variants` are created or updated; variants
    /// not listed are left alone and must be deleted individually. The whole
    /// input is validated before anything is written.
    #[tracing::instrument(skip(self, input))]
    pub async fn save_product(
        &self,
        id: &str,
        mut input: Map<String, Value>,
    ) -> Result<Vec<UpdateOutcome>, DomainError> {
        let variants: Vec<Map<String, Value>> = match input.remove(VARIANT_ALIAS) {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(fields) => fields,
                    _ => Map::new(),
                })
                .collect(),
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                return Err(DomainError::InvalidField {
                    entity: "product",
                    field: VARIANT_ALIAS,
                    expected: "an array",
                });
            }
        };

        validate_product(&input)?;
        for variant in &variants {
            require("variant", variant, &["sku", "price", "id"])?;
        }

        let timestamp = self.clock.now_millis();
        let status = input
            .get(attr::STATUS)
            .cloned()
            .unwrap_or_else(|| ProductStatus::Active.as_str().into());
        let category = input
            .get("category")
            .filter(|v| !is_missing(Some(v)))
            .cloned()
            .unwrap_or_else(|| DEFAULT_CATEGORY.into());

        let root = ConditionalUpdate::new(RecordKey::root(id, PRODUCT_DISCRIMINATOR))
            .set_all(business_fields(&input))
            .set(attr::DISCRIMINATOR, PRODUCT_DISCRIMINATOR)
            .set(attr::DELETED, Value::Null)
            .set(attr::TTL, self.retention.live_ttl(timestamp))
            .set(attr::STATUS, status)
            .set("category", category);

        let mut updates = vec![self.stamp(root, timestamp)];
        for variant in variants {
            let variant_id = id_string(variant.get("id")).unwrap_or_default();
            let key = RecordKey::child(id, VARIANT_ALIAS, &variant_id);
            updates.push(self.variant_update(key, variant, timestamp));
        }

        let outcomes = self.store.batch_update(updates).await?;
        metrics::counter!("product_writes_total", "operation" => "save_product").increment(1);
        tracing::info!(
            product_id = %id,
            applied = outcomes.iter().filter(|o| o.is_applied()).count(),
            "product saved"
        );

        Ok(outcomes)
    }

    /// Tombstones a product. The tombstone is kept for the short retention
    /// window.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: &str) -> Result<UpdateOutcome, DomainError> {
        let timestamp = self.clock.now_millis();
        let update = ConditionalUpdate::new(RecordKey::root(id, PRODUCT_DISCRIMINATOR))
            .set(attr::DISCRIMINATOR, PRODUCT_DISCRIMINATOR)
            .set(attr::DELETED, true)
            .set(attr::TTL, self.retention.tombstone_ttl(timestamp));

        self.write("delete_product", self.stamp(update, timestamp)).await
    }

    /// Atomically adds `delta` to a product's stock.
    #[tracing::instrument(skip(self))]
    pub async fn update_product_stock(
        &self,
        id: &str,
        delta: i64,
    ) -> Result<UpdateOutcome, DomainError> {
        let timestamp = self.clock.now_millis();
        let update = ConditionalUpdate::new(RecordKey::root(id, PRODUCT_DISCRIMINATOR))
            .set(attr::DISCRIMINATOR, PRODUCT_DISCRIMINATOR)
            .add("stockQuantity", delta);

        self.write("update_product_stock", self.stamp(update, timestamp))
            .await
    }

    /// Sets a product's price.
    #[tracing::instrument(skip(self))]
    pub async fn update_product_price(
        &self,
        id: &str,
        price: f64,
    ) -> Result<UpdateOutcome, DomainError> {
        let timestamp = self.clock.now_millis();
        let update = ConditionalUpdate::new(RecordKey::root(id, PRODUCT_DISCRIMINATOR))
            .set(attr::DISCRIMINATOR, PRODUCT_DISCRIMINATOR)
            .set("price", price);

        self.write("update_product_price", self.stamp(update, timestamp))
            .await
    }

    /// Creates or updates a single variant.
    #[tracing::instrument(skip(self, input))]
    pub async fn save_variant(
        &self,
        id: &str,
        variant_id: &str,
        input: Map<String, Value>,
    ) -> Result<UpdateOutcome, DomainError> {
        validate_variant(&input)?;

        let timestamp = self.clock.now_millis();
        let key = RecordKey::child(id, VARIANT_ALIAS, variant_id);
        let update = self.variant_update(key, input, timestamp);

        self.write("save_variant", update).await
    }

    /// Tombstones a variant.
    #[tracing::instrument(skip(self))]
    pub async fn delete_variant(
        &self,
        id: &str,
        variant_id: &str,
    ) -> Result<UpdateOutcome, DomainError> {
        let timestamp = self.clock.now_millis();
        let update = ConditionalUpdate::new(RecordKey::child(id, VARIANT_ALIAS, variant_id))
            .set(attr::DISCRIMINATOR, VARIANT_DISCRIMINATOR)
            .set(attr::DELETED, true)
            .set(attr::TTL, self.retention.tombstone_ttl(timestamp));

        self.write("delete_variant", self.stamp(update, timestamp)).await
    }

    /// Atomically adds `delta` to a variant's stock.
    #[tracing::instrument(skip(self))]
    pub async fn update_variant_stock(
        &self,
        id: &str,
        variant_id: &str,
        delta: i64,
    ) -> Result<UpdateOutcome, DomainError> {
        let timestamp = self.clock.now_millis();
        let update = ConditionalUpdate::new(RecordKey::child(id, VARIANT_ALIAS, variant_id))
            .set(attr::DISCRIMINATOR, VARIANT_DISCRIMINATOR)
            .add("stockQuantity", delta);

        self.write("update_variant_stock", self.stamp(update, timestamp))
            .await
    }

    /// Sets a variant's price.
    #[tracing::instrument(skip(self))]
    pub async fn update_variant_price(
        &self,
        id: &str,
        variant_id: &str,
        price: f64,
    ) -> Result<UpdateOutcome, DomainError> {
        let timestamp = self.clock.now_millis();
        let update = ConditionalUpdate::new(RecordKey::child(id, VARIANT_ALIAS, variant_id))
            .set(attr::DISCRIMINATOR, VARIANT_DISCRIMINATOR)
            .set("price", price);

        self.write("update_variant_price", self.stamp(update, timestamp))
            .await
    }

    async fn write(
        &self,
        operation: &'static str,
        update: ConditionalUpdate,
    ) -> Result<UpdateOutcome, DomainError> {
        let key = update.key.clone();
        let outcome = self.store.update(update).await?;

        metrics::counter!("product_writes_total", "operation" => operation).increment(1);
        tracing::info!(%key, operation, applied = outcome.is_applied(), "direct write");

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ManualClock;
    use record_store::InMemoryRecordStore;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn service() -> (ProductService<InMemoryRecordStore>, ManualClock) {
        let clock = ManualClock::new(1_000);
        let store = InMemoryRecordStore::with_clock(Arc::new(clock.clone()));
        let service = ProductService::new(store)
            .with_clock(Arc::new(clock.clone()))
            .with_region(Some("eu-west-1".to_string()));
        (service, clock)
    }

    #[test]
    fn missing_means_absent_null_or_empty() {
        let fields = object(json!({ "name": "", "sku": null, "price": 0 }));
        let err = validate_product(&fields).unwrap_err();
        assert_eq!(err.missing, vec!["name", "sku"]);
        assert_eq!(
            err.to_string(),
            "product is missing required fields: name, sku"
        );
    }

    #[tokio::test]
    async fn save_rejects_variants_that_are_not_a_list() {
        let (service, _) = service();
        let input = object(json!({
            "name": "Widget",
            "sku": "W-1",
            "price": 9.99,
            "variants": { "id": "v1", "sku": "W-1-S", "price": 1 }
        }));

        let err = service.save_product("p1", input).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidField {
                field: "variants",
                ..
            }
        ));
        assert_eq!(service.store().record_count().await, 0);
    }

    #[tokio::test]
    async fn save_rejects_invalid_variant_before_writing() {
        let (service, _) = service();
        let input = object(json!({
            "name": "Widget",
            "sku": "W-1",
            "price": 9.99,
            "variants": [{ "id": "v1", "sku": "W-1-S" }]
        }));

        let result = service.save_product("p1", input).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(service.store().record_count().await, 0);
    }

    #[tokio::test]
    async fn save_writes_root_and_variants_with_defaults() {
        let (service, _) = service();
        let input = object(json!({
            "name": "Widget",
            "sku": "W-1",
            "price": 9.99,
            "variants": [{ "id": "v1", "sku": "W-1-S", "price": 10.5 }]
        }));

        let outcomes = service.save_product("p1", input).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(UpdateOutcome::is_applied));

        let records = service.store().get("p1").await.unwrap();
        let root = records.iter().find(|r| r.sort_key == "product").unwrap();
        assert_eq!(root.status(), Some("ACTIVE"));
        assert_eq!(root.field("category"), Some(&json!("general")));
        assert_eq!(root.timestamp, Some(1_000));
        assert_eq!(root.last_modified_by.as_deref(), Some("system"));
        assert_eq!(root.region.as_deref(), Some("eu-west-1"));
        assert_eq!(root.ttl, Some(1 + 365 * 86_400));

        let variant = records.iter().find(|r| r.sort_key == "variants|v1").unwrap();
        assert_eq!(variant.discriminator, "product-variant");
        assert_eq!(variant.field("stockQuantity"), Some(&json!(0)));
        assert!(variant.field("id").is_none());
    }

    #[tokio::test]
    async fn delete_leaves_short_lived_tombstone() {
        let (service, clock) = service();
        service
            .save_product("p1", object(json!({ "name": "W", "sku": "S", "price": 1 })))
            .await
            .unwrap();
        clock.advance(1);

        let outcome = service.delete_product("p1").await.unwrap();
        assert!(outcome.is_applied());

        let root = service
            .store()
            .get_record(&RecordKey::root("p1", "product"))
            .await
            .unwrap()
            .unwrap();
        assert!(root.is_deleted());
        assert_eq!(root.ttl, Some(1 + 30 * 86_400));
        assert_eq!(root.field("name"), Some(&json!("W")));
    }

    #[tokio::test]
    async fn same_millisecond_write_is_rejected() {
        let (service, _) = service();
        service
            .save_product("p1", object(json!({ "name": "W", "sku": "S", "price": 1 })))
            .await
            .unwrap();

        let outcome = service.update_product_price("p1", 2.0).await.unwrap();
        assert!(!outcome.is_applied());
    }

    #[tokio::test]
    async fn stock_updates_add() {
        let (service, clock) = service();
        service
            .save_variant("p1", "v1", object(json!({ "sku": "S", "price": 1, "stockQuantity": 5 })))
            .await
            .unwrap();
        clock.advance(1);
        service.update_variant_stock("p1", "v1", -2).await.unwrap();

        let variant = service
            .store()
            .get_record(&RecordKey::child("p1", "variants", "v1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(variant.field("stockQuantity"), Some(&json!(3)));
        assert_eq!(variant.timestamp, Some(1_001));
    }

    #[tokio::test]
    async fn claims_are_recorded() {
        let (service, _) = service();
        let service = service.with_claims(Claims {
            username: "alice".to_string(),
        });
        service
            .save_variant("p1", "v1", object(json!({ "sku": "S", "price": 1 })))
            .await
            .unwrap();

        let variant = service
            .store()
            .get_record(&RecordKey::child("p1", "variants", "v1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(variant.last_modified_by.as_deref(), Some("alice"));
    }
}
