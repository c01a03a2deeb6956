//! Confirmed change → aggregate → derived event.

use domain::ChangeEvent;
use record_store::{Condition, ConditionalUpdate, Record, attr};

use crate::config::PipelineConfig;
use crate::publisher::DerivedEvent;

/// Returns true if the derived event for `image` was already emitted or has
/// been superseded by a newer announcement.
///
/// Either the image itself is latched, or the stored copy is latched at the
/// same or a newer version. A redelivered older change must not overwrite
/// what downstream already saw.
pub fn already_emitted(image: &Record, stored: Option<&Record>) -> bool {
    if image.is_latched() {
        return true;
    }
    stored.is_some_and(|s| s.is_latched() && s.timestamp >= image.timestamp)
}

/// Replaces the fetched copy of the changed record with `image`.
///
/// Queries may lag the write, so a missing copy is appended instead. The
/// result never holds two records with the same key.
pub fn merge_image(related: Vec<Record>, image: &Record) -> Vec<Record> {
    let mut merged = Vec::with_capacity(related.len() + 1);
    let mut replaced = false;

    for record in related {
        if record.partition_key == image.partition_key && record.sort_key == image.sort_key {
            if !replaced {
                merged.push(image.clone());
                replaced = true;
            }
        } else {
            merged.push(record);
        }
    }
    if !replaced {
        merged.push(image.clone());
    }

    merged
}

/// Picks the outgoing type.
///
/// Deletions keep the trigger's type. Otherwise the root record's status is
/// looked up in the status table, falling back to the trigger's type.
pub fn derive_event_type(event: &ChangeEvent, merged: &[Record], config: &PipelineConfig) -> String {
    if event.is_deletion() {
        return event.event_type.clone();
    }

    merged
        .iter()
        .find(|r| r.discriminator == config.mapper.root())
        .and_then(Record::status)
        .and_then(|status| config.statuses.event_type_for_stored(status))
        .map(str::to_string)
        .unwrap_or_else(|| event.event_type.clone())
}

/// Builds the derived event for a change whose related records are known.
pub fn assemble(
    event: &ChangeEvent,
    image: &Record,
    related: Vec<Record>,
    config: &PipelineConfig,
) -> DerivedEvent {
    let merged = merge_image(related, image);
    let event_type = derive_event_type(event, &merged, config);
    let timestamp = image.timestamp.unwrap_or(event.timestamp);

    DerivedEvent::new(event_type, timestamp, config.mapper.map(&merged))
}

/// Marks the emitted version of the record as latched.
///
/// Conditioned on the stored timestamp still being the emitted one, so a
/// newer write is never marked as announced. `None` if the image carries no
/// timestamp to condition on.
pub fn latch_request(image: &Record) -> Option<ConditionalUpdate> {
    image.timestamp.map(|timestamp| {
        ConditionalUpdate::new(image.key())
            .set(attr::LATCHED, true)
            .condition(Condition::TimestampEquals(timestamp))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_store::RecordKey;
    use serde_json::json;

    fn config() -> PipelineConfig {
        PipelineConfig::catalog().unwrap()
    }

    fn root(status: &str, timestamp: i64) -> Record {
        Record::new(RecordKey::root("p1", "product"), "product")
            .with_timestamp(timestamp)
            .with_field("name", json!("Widget"))
            .with_field("status", json!(status))
    }

    fn variant(id: &str, timestamp: i64) -> Record {
        Record::new(RecordKey::child("p1", "variants", id), "product-variant")
            .with_timestamp(timestamp)
            .with_field("sku", json!(id))
    }

    fn change_event(event_type: &str) -> ChangeEvent {
        ChangeEvent::new(event_type, 7).with_entity_id("p1")
    }

    #[test]
    fn merge_replaces_same_key_only() {
        let related = vec![root("DRAFT", 1), variant("v1", 1), variant("v2", 1)];
        let image = variant("v1", 2).with_field("sku", json!("new"));

        let merged = merge_image(related, &image);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].status(), Some("DRAFT"));
        assert_eq!(merged[1].field("sku"), Some(&json!("new")));
    }

    #[test]
    fn merge_appends_missing_image() {
        let merged = merge_image(vec![root("DRAFT", 1)], &variant("v9", 2));
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].sort_key, "variants|v9");
    }

    #[test]
    fn type_follows_root_status() {
        let config = config();
        let event = change_event("product-variant-updated");
        let merged = vec![root("ACTIVE", 1), variant("v1", 2)];
        assert_eq!(derive_event_type(&event, &merged, &config), "product-published");
    }

    #[test]
    fn deletion_type_is_preserved() {
        let config = config();
        let event = change_event("product-deleted");
        let merged = vec![root("ACTIVE", 1).with_deleted(true)];
        assert_eq!(derive_event_type(&event, &merged, &config), "product-deleted");
    }

    #[test]
    fn unknown_status_falls_back_to_trigger_type() {
        let config = config();
        let event = change_event("product-updated");
        assert_eq!(
            derive_event_type(&event, &[root("archived", 1)], &config),
            "product-updated"
        );
        assert_eq!(derive_event_type(&event, &[], &config), "product-updated");
    }

    #[test]
    fn assembled_event_carries_aggregate_and_image_timestamp() {
        let config = config();
        let image = root("DRAFT", 42);
        let derived = assemble(
            &change_event("product-updated"),
            &image,
            vec![root("ACTIVE", 1), variant("v1", 1)],
            &config,
        );

        assert_eq!(derived.event_type, "product-draft");
        assert_eq!(derived.timestamp, 42);
        assert_eq!(derived.aggregate.field("id"), Some(&json!("p1")));
        assert_eq!(derived.aggregate.children("variants").len(), 1);
    }

    #[test]
    fn latch_detection() {
        let image = root("ACTIVE", 5);
        assert!(!already_emitted(&image, None));
        assert!(already_emitted(&image.clone().with_latched(true), None));
        assert!(already_emitted(&image, Some(&root("ACTIVE", 5).with_latched(true))));
        assert!(!already_emitted(&image, Some(&root("ACTIVE", 6))));
        assert!(!already_emitted(&image, Some(&root("ACTIVE", 4).with_latched(true))));
    }

    #[test]
    fn newer_latched_copy_supersedes_image() {
        let image = root("DRAFT", 5);
        assert!(already_emitted(&image, Some(&root("ACTIVE", 6).with_latched(true))));
    }

    #[test]
    fn latch_is_conditioned_on_emitted_version() {
        let request = latch_request(&root("ACTIVE", 5)).unwrap();
        assert_eq!(request.condition, Condition::TimestampEquals(5));
        assert_eq!(request.value_of("latched"), Some(&json!(true)));
        assert!(latch_request(&Record::new(RecordKey::root("p1", "product"), "product")).is_none());
    }
}
