//! Inbound change events.
//!
//! Producers disagree on field names: the type may arrive as `type` or
//! `eventType` (with `type = "thing-product"` as a legacy envelope), the
//! entity id as `entityId` or `productId`, and the business payload as
//! `payload`, `product` or `data`. [`RawEvent`] accepts all of them and is
//! converted into the canonical [`ChangeEvent`] once, at deserialization.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use record_store::{ChangeRecord, Record, attr};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MalformedEvent;

/// Legacy envelope type whose real token travels in `eventType`.
pub const LEGACY_ENVELOPE_TYPE: &str = "thing-product";

/// Payload attributes that name the entity or are owned by the store, and
/// so never come from a producer.
const RESERVED_FIELDS: [&str; 10] = [
    "id",
    attr::PARTITION_KEY,
    attr::SORT_KEY,
    attr::DISCRIMINATOR,
    attr::TIMESTAMP,
    attr::LAST_MODIFIED_BY,
    attr::DELETED,
    attr::LATCHED,
    attr::TTL,
    attr::REGION,
];

/// An inbound event exactly as producers send it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub entity_id: Option<Value>,
    #[serde(default)]
    pub product_id: Option<Value>,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
    #[serde(default)]
    pub product: Option<Map<String, Value>>,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    #[serde(default)]
    pub before: Option<Record>,
    #[serde(default)]
    pub after: Option<Record>,
}

impl RawEvent {
    /// Picks the canonical type token.
    fn canonical_type(&self) -> Option<String> {
        let kind = self.kind.as_deref().filter(|s| !s.is_empty());
        let event_type = self.event_type.as_deref().filter(|s| !s.is_empty());

        match (kind, event_type) {
            (Some(LEGACY_ENVELOPE_TYPE), Some(inner)) => Some(inner.to_string()),
            (Some(kind), _) => Some(kind.to_string()),
            (None, Some(inner)) => Some(inner.to_string()),
            (None, None) => None,
        }
    }

    /// `entityId` wins over `productId`; empty ids are skipped.
    fn canonical_entity_id(&self) -> Option<String> {
        [&self.entity_id, &self.product_id]
            .into_iter()
            .find_map(|id| match id {
                Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
                Some(Value::Number(id)) => Some(id.to_string()),
                _ => None,
            })
    }

    /// `payload`, then `product`, then `data`.
    fn canonical_payload(self) -> Map<String, Value> {
        self.payload
            .or(self.product)
            .or(self.data)
            .unwrap_or_default()
    }
}

/// A normalized change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawEvent")]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Record>,
}

impl TryFrom<RawEvent> for ChangeEvent {
    type Error = MalformedEvent;

    fn try_from(mut raw: RawEvent) -> Result<Self, Self::Error> {
        let event_type = raw.canonical_type().ok_or(MalformedEvent::MissingType)?;
        let timestamp = raw
            .timestamp
            .as_ref()
            .filter(|v| !v.is_null())
            .ok_or(MalformedEvent::MissingTimestamp)
            .and_then(parse_timestamp)?;

        let entity_id = raw.canonical_entity_id();
        let before = raw.before.take();
        let after = raw.after.take();

        Ok(Self {
            event_type,
            timestamp,
            entity_id,
            payload: raw.canonical_payload(),
            before,
            after,
        })
    }
}

impl ChangeEvent {
    /// Creates an event with an empty payload.
    pub fn new(event_type: impl Into<String>, timestamp: i64) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp,
            entity_id: None,
            payload: Map::new(),
            before: None,
            after: None,
        }
    }

    /// Sets the event-level entity id.
    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Sets the business payload.
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Parses and normalizes an event body.
    pub fn from_slice(body: &[u8]) -> Result<Self, MalformedEvent> {
        let raw: RawEvent = serde_json::from_slice(body)?;
        raw.try_into()
    }

    /// Normalizes an already-decoded event body.
    pub fn from_value(body: Value) -> Result<Self, MalformedEvent> {
        let raw: RawEvent = serde_json::from_value(body)?;
        raw.try_into()
    }

    /// Builds the event the trigger pipeline sees for a confirmed store change.
    ///
    /// The type is `<discriminator>-<created|updated|deleted>` and the
    /// timestamp is the newest image's.
    pub fn from_change(change: &ChangeRecord) -> Result<Self, MalformedEvent> {
        let event_type = change.event_type().ok_or(MalformedEvent::MissingType)?;
        let timestamp = change
            .image()
            .and_then(|r| r.timestamp)
            .ok_or(MalformedEvent::MissingTimestamp)?;

        Ok(Self {
            event_type,
            timestamp,
            entity_id: Some(change.key.partition_key.clone()),
            payload: Map::new(),
            before: change.before.clone(),
            after: change.after.clone(),
        })
    }

    /// Returns true for deletion-type events.
    pub fn is_deletion(&self) -> bool {
        self.event_type.ends_with("-deleted")
    }

    /// Returns the newest image carried by the event.
    pub fn image(&self) -> Option<&Record> {
        self.after.as_ref().or(self.before.as_ref())
    }

    /// Resolves the entity id: event level first, then the payload's `id`,
    /// then its `partitionKey`.
    pub fn resolve_entity_id(&self) -> Result<String, MalformedEvent> {
        if let Some(id) = self.entity_id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }

        ["id", attr::PARTITION_KEY]
            .iter()
            .find_map(|name| match self.payload.get(*name) {
                Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
                Some(Value::Number(id)) => Some(id.to_string()),
                _ => None,
            })
            .ok_or_else(|| MalformedEvent::MissingEntityId {
                event_type: self.event_type.clone(),
            })
    }

    /// Returns the payload without identity or store-owned attributes.
    pub fn business_fields(&self) -> Map<String, Value> {
        business_fields(&self.payload)
    }
}

/// Copies `fields` without identity attributes and the typed attributes the
/// store sets itself.
pub fn business_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(name, _)| !RESERVED_FIELDS.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Normalizes a timestamp to epoch milliseconds.
///
/// Accepts numbers, numeric strings, RFC 3339 datetimes, naive datetimes
/// (read as UTC) and plain dates (midnight UTC).
pub fn parse_timestamp(value: &Value) -> Result<i64, MalformedEvent> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| MalformedEvent::InvalidTimestamp(n.to_string())),
        Value::String(s) => parse_timestamp_str(s.trim()),
        other => Err(MalformedEvent::InvalidTimestamp(other.to_string())),
    }
}

fn parse_timestamp_str(s: &str) -> Result<i64, MalformedEvent> {
    if let Ok(millis) = s.parse::<i64>() {
        return Ok(millis);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }
    if let Some(dt) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(dt.and_utc().timestamp_millis());
    }

    Err(MalformedEvent::InvalidTimestamp(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_store::RecordKey;
    use serde_json::json;

    #[test]
    fn canonical_shape_parses() {
        let event = ChangeEvent::from_value(json!({
            "type": "product-published",
            "entityId": "p1",
            "timestamp": 1000,
            "payload": { "name": "Widget" }
        }))
        .unwrap();

        assert_eq!(event.event_type, "product-published");
        assert_eq!(event.entity_id.as_deref(), Some("p1"));
        assert_eq!(event.timestamp, 1000);
        assert_eq!(event.payload["name"], "Widget");
    }

    #[test]
    fn event_type_field_is_accepted() {
        let event = ChangeEvent::from_value(json!({
            "eventType": "product-published",
            "productId": "test-123",
            "timestamp": 1692097847000i64,
            "product": { "name": "Test Product", "sku": "TST-123", "price": 19.99 }
        }))
        .unwrap();

        assert_eq!(event.event_type, "product-published");
        assert_eq!(event.entity_id.as_deref(), Some("test-123"));
        assert_eq!(event.payload["sku"], "TST-123");
    }

    #[test]
    fn legacy_envelope_uses_inner_type_and_data() {
        let event = ChangeEvent::from_value(json!({
            "type": "thing-product",
            "eventType": "product-deactivated",
            "timestamp": "2024-01-02T03:04:05Z",
            "data": { "id": "p9" }
        }))
        .unwrap();

        assert_eq!(event.event_type, "product-deactivated");
        assert_eq!(event.timestamp, 1_704_164_645_000);
        assert_eq!(event.resolve_entity_id().unwrap(), "p9");
    }

    #[test]
    fn overlapping_legacy_keys_resolve_by_precedence() {
        let event = ChangeEvent::from_value(json!({
            "type": "product-published",
            "entityId": "p1",
            "productId": "p2",
            "timestamp": 1,
            "product": { "name": "From product" },
            "data": { "name": "From data" }
        }))
        .unwrap();
        assert_eq!(event.entity_id.as_deref(), Some("p1"));
        assert_eq!(event.payload["name"], "From product");

        let event = ChangeEvent::from_value(json!({
            "type": "product-published",
            "entityId": "",
            "productId": "p2",
            "timestamp": 1,
            "payload": { "name": "From payload" },
            "product": { "name": "From product" },
            "data": { "name": "From data" }
        }))
        .unwrap();
        assert_eq!(event.entity_id.as_deref(), Some("p2"));
        assert_eq!(event.payload["name"], "From payload");
    }

    #[test]
    fn missing_type_or_timestamp_is_malformed() {
        assert!(matches!(
            ChangeEvent::from_value(json!({ "timestamp": 1 })),
            Err(MalformedEvent::MissingType)
        ));
        assert!(matches!(
            ChangeEvent::from_value(json!({ "type": "product-draft" })),
            Err(MalformedEvent::MissingTimestamp)
        ));
        assert!(matches!(
            ChangeEvent::from_slice(b"not json"),
            Err(MalformedEvent::Json(_))
        ));
    }

    #[test]
    fn timestamp_formats_normalize_to_millis() {
        assert_eq!(parse_timestamp(&json!(1500)).unwrap(), 1500);
        assert_eq!(parse_timestamp(&json!("1500")).unwrap(), 1500);
        assert_eq!(parse_timestamp(&json!("1970-01-01T00:00:01.5Z")).unwrap(), 1500);
        assert_eq!(parse_timestamp(&json!("1970-01-01 00:00:02")).unwrap(), 2000);
        assert_eq!(parse_timestamp(&json!("1970-01-02")).unwrap(), 86_400_000);
        assert!(parse_timestamp(&json!("yesterday")).is_err());
        assert!(parse_timestamp(&json!(true)).is_err());
    }

    #[test]
    fn entity_id_falls_back_through_payload() {
        let mut payload = Map::new();
        payload.insert("partitionKey".into(), json!("p2"));
        let event = ChangeEvent::new("product-draft", 1).with_payload(payload);
        assert_eq!(event.resolve_entity_id().unwrap(), "p2");

        let explicit = event.clone().with_entity_id("p1");
        assert_eq!(explicit.resolve_entity_id().unwrap(), "p1");

        let anonymous = ChangeEvent::new("product-draft", 1);
        assert!(matches!(
            anonymous.resolve_entity_id(),
            Err(MalformedEvent::MissingEntityId { .. })
        ));
    }

    #[test]
    fn business_fields_drop_identity() {
        let Value::Object(payload) = json!({ "id": "p1", "sortKey": "x", "name": "Widget" }) else {
            unreachable!()
        };
        let fields = business_fields(&payload);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["name"], "Widget");
    }

    #[test]
    fn business_fields_drop_store_owned_attributes() {
        let Value::Object(payload) = json!({
            "region": 42,
            "ttl": "never",
            "latched": "yes",
            "deleted": 1,
            "status": "ACTIVE"
        }) else {
            unreachable!()
        };
        let fields = business_fields(&payload);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["status"], "ACTIVE");
    }

    #[test]
    fn change_record_becomes_trigger_event() {
        let after = Record::new(RecordKey::child("p1", "variants", "v1"), "product-variant")
            .with_timestamp(42);
        let change = ChangeRecord {
            key: after.key(),
            before: None,
            after: Some(after),
        };

        let event = ChangeEvent::from_change(&change).unwrap();
        assert_eq!(event.event_type, "product-variant-created");
        assert_eq!(event.timestamp, 42);
        assert_eq!(event.entity_id.as_deref(), Some("p1"));
        assert!(!event.is_deletion());
    }

    #[test]
    fn canonical_event_serializes_with_type_field() {
        let event = ChangeEvent::new("product-deleted", 2000).with_entity_id("p1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "product-deleted");
        assert_eq!(json["entityId"], "p1");
        assert!(json.get("payload").is_none());
        assert!(event.is_deletion());

        let back: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
