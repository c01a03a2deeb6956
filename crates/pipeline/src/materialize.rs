//! Change event → conditional update.

use domain::{ChangeEvent, MalformedEvent, timestamp_condition};
use record_store::{ConditionalUpdate, RecordKey, attr};
use serde_json::Value;

use crate::config::PipelineConfig;
use crate::rules::MaterializeSpec;

/// Builds the conditional update that materializes `event`.
///
/// The write targets the root record `(entity id, discriminator)` and only
/// applies if the stored timestamp is absent or older than the event's, so
/// replays and out-of-order deliveries converge on the newest event.
///
/// A type found in the status table sets `status`; otherwise the payload's
/// status, if any, is kept. Deletion types set `deleted = true`. `latched`
/// is cleared so the new state is announced once downstream.
pub fn to_update_request(
    event: &ChangeEvent,
    spec: &MaterializeSpec,
    config: &PipelineConfig,
) -> Result<ConditionalUpdate, MalformedEvent> {
    let entity_id = event.resolve_entity_id()?;
    let timestamp = event.timestamp;
    let deleted = event.is_deletion();

    let last_modified_by = event
        .payload
        .get(attr::LAST_MODIFIED_BY)
        .and_then(Value::as_str)
        .unwrap_or("system")
        .to_string();

    let status = config
        .statuses
        .status_for(&event.event_type)
        .map(|s| s.as_str());

    let update = ConditionalUpdate::new(RecordKey::root(entity_id, &spec.discriminator))
        .set_all(event.business_fields())
        .set_opt(attr::STATUS, status)
        .set(attr::DISCRIMINATOR, spec.discriminator.clone())
        .set(attr::LAST_MODIFIED_BY, last_modified_by)
        .set(attr::TIMESTAMP, timestamp)
        .set(attr::DELETED, if deleted { Value::Bool(true) } else { Value::Null })
        .set(attr::LATCHED, Value::Null)
        .set(attr::TTL, config.retention.ttl_for(timestamp, deleted))
        .set_opt(attr::REGION, config.region.clone())
        .condition(timestamp_condition(timestamp));

    Ok(update)
}
