//! Event-at-a-time pipeline driver.

use std::sync::Arc;
use std::time::Instant;

use common::{RecordKey, SharedClock, SystemClock};
use domain::ChangeEvent;
use futures_util::StreamExt;
use projections::Aggregate;
use record_store::{ChangeFeed, ChangeRecord, RecordStore, UpdateOutcome};
use serde_json::Value;

use crate::cdc;
use crate::config::{PipelineConfig, PipelineKind};
use crate::error::{PipelineError, Result};
use crate::job::Job;
use crate::materialize;
use crate::publisher::{
    DerivedEvent, EventPublisher, InMemoryPublisher, InMemoryScanSink, ScanSink,
};
use crate::rules::{CdcSpec, MaterializeSpec, RuleAction};

/// What happened to one event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// A conditional write was issued; `applied` is false for stale or
    /// duplicate events.
    Materialized { key: RecordKey, applied: bool },
    /// A derived event was published.
    Emitted { event_type: String, key: RecordKey },
    /// The change had already been announced.
    Suppressed { key: RecordKey },
    /// A scheduled job ran and emitted its alert.
    JobCompleted { job: &'static str, matched: usize },
    /// No rule matched.
    Dropped { event_type: String },
}

/// Per-event results of one batch, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<Result<EventOutcome>>,
}

impl BatchReport {
    /// Returns the failed events with their position in the batch.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &PipelineError)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }

    /// Returns the successful outcomes.
    pub fn outcomes(&self) -> impl Iterator<Item = &EventOutcome> {
        self.results.iter().filter_map(|r| r.as_ref().ok())
    }

    /// Returns true if every event succeeded.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.is_ok())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Routes events through one rule table and applies the matched strategy.
///
/// Each event is processed on its own under the configured time budget and
/// its result reported individually. There is no retry here; failed events
/// are left to the transport's redelivery.
#[derive(Clone)]
pub struct Pipeline<S: RecordStore> {
    kind: PipelineKind,
    store: S,
    config: Arc<PipelineConfig>,
    publisher: Arc<dyn EventPublisher>,
    scan_sink: Arc<dyn ScanSink>,
    clock: SharedClock,
}

impl<S: RecordStore> Pipeline<S> {
    /// Creates a pipeline with in-memory downstream collaborators.
    pub fn new(kind: PipelineKind, store: S, config: Arc<PipelineConfig>) -> Self {
        Self {
            kind,
            store,
            config,
            publisher: Arc::new(InMemoryPublisher::new()),
            scan_sink: Arc::new(InMemoryScanSink::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Pipeline for inbound domain events.
    pub fn listener(store: S, config: Arc<PipelineConfig>) -> Self {
        Self::new(PipelineKind::Listener, store, config)
    }

    /// Pipeline for store changes and timer events.
    pub fn trigger(store: S, config: Arc<PipelineConfig>) -> Self {
        Self::new(PipelineKind::Trigger, store, config)
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_scan_sink(mut self, scan_sink: Arc<dyn ScanSink>) -> Self {
        self.scan_sink = scan_sink;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Parses and processes raw message bodies. A body that cannot be
    /// normalized fails on its own without affecting the rest.
    #[tracing::instrument(skip_all, fields(pipeline = self.kind.as_str()))]
    pub async fn handle_messages<B: AsRef<[u8]>>(&self, bodies: &[B]) -> BatchReport {
        let mut report = BatchReport::default();
        for body in bodies {
            let result = match ChangeEvent::from_slice(body.as_ref()) {
                Ok(event) => self.handle_event(event).await,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed event");
                    Err(e.into())
                }
            };
            report.results.push(result);
        }
        report
    }

    /// Processes event bodies that were already decoded as JSON, such as
    /// the elements of an HTTP batch.
    #[tracing::instrument(skip_all, fields(pipeline = self.kind.as_str(), count = bodies.len()))]
    pub async fn handle_values(&self, bodies: Vec<Value>) -> BatchReport {
        let mut report = BatchReport::default();
        for body in bodies {
            let result = match ChangeEvent::from_value(body) {
                Ok(event) => self.handle_event(event).await,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed event");
                    Err(e.into())
                }
            };
            report.results.push(result);
        }
        report
    }

    /// Processes confirmed store changes, oldest first.
    #[tracing::instrument(skip_all, fields(pipeline = self.kind.as_str(), count = changes.len()))]
    pub async fn handle_changes(&self, changes: Vec<ChangeRecord>) -> BatchReport {
        let mut report = BatchReport::default();
        for change in &changes {
            let result = match ChangeEvent::from_change(change) {
                Ok(event) => self.handle_event(event).await,
                Err(e) => Err(e.into()),
            };
            report.results.push(result);
        }
        report
    }

    /// Processes one normalized event within the time budget.
    pub async fn handle_event(&self, event: ChangeEvent) -> Result<EventOutcome> {
        let budget = self.config.event_timeout;
        let event_type = event.event_type.clone();
        let start = Instant::now();

        let result = match tokio::time::timeout(budget, self.dispatch(event)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout {
                event_type: event_type.clone(),
                budget,
            }),
        };

        metrics::histogram!("pipeline_event_duration_seconds", "pipeline" => self.kind.as_str())
            .record(start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::counter!("pipeline_events_failed_total", "pipeline" => self.kind.as_str())
                .increment(1);
            tracing::warn!(%event_type, error = %e, class = ?e.class(), "event failed");
        }

        result
    }

    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    async fn dispatch(&self, event: ChangeEvent) -> Result<EventOutcome> {
        let Some(rule) = self.config.registry(self.kind).route(&event.event_type) else {
            metrics::counter!("pipeline_events_dropped_total", "pipeline" => self.kind.as_str())
                .increment(1);
            tracing::debug!("no rule matched, dropping event");
            return Ok(EventOutcome::Dropped {
                event_type: event.event_type,
            });
        };

        metrics::counter!("pipeline_events_total", "flavor" => rule.flavor().as_str())
            .increment(1);
        tracing::debug!(rule = %rule.id, flavor = %rule.flavor(), "rule matched");

        match &rule.action {
            RuleAction::Materialize(spec) => self.materialize(&event, spec).await,
            RuleAction::Cdc(spec) => self.cdc(&event, *spec).await,
            RuleAction::Job(job) => self.run_job(*job).await,
        }
    }

    async fn materialize(
        &self,
        event: &ChangeEvent,
        spec: &MaterializeSpec,
    ) -> Result<EventOutcome> {
        let update = materialize::to_update_request(event, spec, &self.config)?;
        let key = update.key.clone();

        let applied = match self.store.update(update).await? {
            UpdateOutcome::Applied(_) => true,
            UpdateOutcome::ConditionFailed {
                stored_timestamp, ..
            } => {
                metrics::counter!("pipeline_condition_failures_total").increment(1);
                tracing::debug!(
                    %key,
                    incoming = event.timestamp,
                    stored = ?stored_timestamp,
                    "stale event ignored"
                );
                false
            }
        };

        Ok(EventOutcome::Materialized { key, applied })
    }

    async fn cdc(&self, event: &ChangeEvent, spec: CdcSpec) -> Result<EventOutcome> {
        let image = event
            .image()
            .ok_or_else(|| PipelineError::MissingImage {
                event_type: event.event_type.clone(),
            })?;
        let key = image.key();

        let stored = self.store.get_record(&key).await?;
        if cdc::already_emitted(image, stored.as_ref()) {
            tracing::debug!(%key, "change already announced");
            return Ok(EventOutcome::Suppressed { key });
        }

        let related = if spec.query_related {
            self.store.get(&image.partition_key).await?
        } else {
            Vec::new()
        };

        let derived = cdc::assemble(event, image, related, &self.config);
        self.publisher.publish(&derived).await?;
        metrics::counter!("pipeline_events_emitted_total").increment(1);
        tracing::info!(%key, event_type = %derived.event_type, "derived event emitted");

        if let Some(latch) = cdc::latch_request(image) {
            if !self.store.update(latch).await?.is_applied() {
                tracing::debug!(%key, "record changed before it could be latched");
            }
        }

        Ok(EventOutcome::Emitted {
            event_type: derived.event_type,
            key,
        })
    }

    async fn run_job(&self, job: Job) -> Result<EventOutcome> {
        let request = job.scan_request(self.clock.now_millis());
        let rows = self.store.scan(&request).await?;
        let matched = rows.len();

        self.scan_sink.consume(job.id(), rows).await?;

        let alert = DerivedEvent::new(job.alert_type(), self.clock.now_millis(), Aggregate::empty());
        self.publisher.publish(&alert).await?;
        metrics::counter!("pipeline_events_emitted_total").increment(1);
        tracing::info!(job = job.id(), matched, "scheduled job completed");

        Ok(EventOutcome::JobCompleted {
            job: job.id(),
            matched,
        })
    }
}

impl<S: RecordStore + ChangeFeed> Pipeline<S> {
    /// Takes every pending change from the store's feed and processes it.
    pub async fn drain_changes(&self) -> BatchReport {
        let changes: Vec<ChangeRecord> = self.store.take_changes().await.collect().await;
        if changes.is_empty() {
            return BatchReport::default();
        }
        self.handle_changes(changes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ManualClock;
    use record_store::InMemoryRecordStore;
    use serde_json::json;

    fn pipelines() -> (
        Pipeline<InMemoryRecordStore>,
        Pipeline<InMemoryRecordStore>,
        InMemoryRecordStore,
        InMemoryPublisher,
    ) {
        let clock = ManualClock::new(1_000);
        let store = InMemoryRecordStore::with_clock(Arc::new(clock.clone()));
        let config = Arc::new(PipelineConfig::catalog().unwrap());
        let publisher = InMemoryPublisher::new();

        let listener = Pipeline::listener(store.clone(), config.clone());
        let trigger = Pipeline::trigger(store.clone(), config)
            .with_publisher(Arc::new(publisher.clone()))
            .with_clock(Arc::new(clock));
        (listener, trigger, store, publisher)
    }

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[tokio::test]
    async fn malformed_body_fails_alone() {
        let (listener, _, store, _) = pipelines();
        let report = listener
            .handle_messages(&[
                b"{not json".to_vec(),
                body(json!({ "type": "product-draft", "entityId": "p1", "timestamp": 5 })),
            ])
            .await;

        assert_eq!(report.len(), 2);
        let failures: Vec<usize> = report.failures().map(|(i, _)| i).collect();
        assert_eq!(failures, vec![0]);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn decoded_values_are_processed_in_order() {
        let (listener, _, store, _) = pipelines();
        let report = listener
            .handle_values(vec![
                json!({ "type": "product-draft", "timestamp": 5 }),
                json!({ "type": "product-draft", "productId": "p1", "timestamp": 5 }),
            ])
            .await;

        assert_eq!(report.len(), 2);
        let failures: Vec<usize> = report.failures().map(|(i, _)| i).collect();
        assert_eq!(failures, vec![0]);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn wrongly_typed_region_in_payload_is_ignored() {
        let (listener, _, store, _) = pipelines();
        let outcome = listener
            .handle_event(
                ChangeEvent::new("product-draft", 5)
                    .with_entity_id("p1")
                    .with_payload(
                        json!({ "region": 7, "name": "Widget" })
                            .as_object()
                            .cloned()
                            .unwrap_or_default(),
                    ),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Materialized { applied: true, .. }));
        let record = store
            .get_record(&RecordKey::root("p1", "product"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.region, None);
        assert_eq!(record.field("name"), Some(&json!("Widget")));
    }

    #[tokio::test]
    async fn unmatched_event_has_no_effect() {
        let (listener, _, store, _) = pipelines();
        let outcome = listener
            .handle_event(ChangeEvent::new("order-created", 5).with_entity_id("o1"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            EventOutcome::Dropped {
                event_type: "order-created".into()
            }
        );
        assert_eq!(store.record_count().await, 0);
        assert_eq!(store.pending_changes().await, 0);
    }

    #[tokio::test]
    async fn stale_event_is_a_successful_no_op() {
        let (listener, _, _, _) = pipelines();
        let newer = ChangeEvent::new("product-deleted", 2000).with_entity_id("p1");
        let older = ChangeEvent::new("product-published", 1000).with_entity_id("p1");

        listener.handle_event(newer).await.unwrap();
        let outcome = listener.handle_event(older).await.unwrap();
        assert_eq!(
            outcome,
            EventOutcome::Materialized {
                key: RecordKey::root("p1", "product"),
                applied: false
            }
        );
    }

    #[tokio::test]
    async fn change_is_emitted_once_then_latched() {
        let (listener, trigger, _, publisher) = pipelines();
        listener
            .handle_event(ChangeEvent::new("product-published", 10).with_entity_id("p1"))
            .await
            .unwrap();

        let first = trigger.drain_changes().await;
        assert!(first.is_success());
        assert_eq!(publisher.event_types(), vec!["product-published"]);

        // The latch write itself comes back through the feed and is suppressed.
        let second = trigger.drain_changes().await;
        assert!(matches!(
            second.outcomes().next(),
            Some(EventOutcome::Suppressed { .. })
        ));
        assert_eq!(publisher.events().len(), 1);
    }

    #[tokio::test]
    async fn job_emits_one_alert_regardless_of_matches() {
        let (listener, trigger, _, publisher) = pipelines();
        for (i, id) in ["p1", "p2", "p3"].iter().enumerate() {
            let mut event = ChangeEvent::new("product-published", 10 + i as i64).with_entity_id(*id);
            event.payload.insert("stockQuantity".into(), json!(1));
            listener.handle_event(event).await.unwrap();
        }
        trigger.drain_changes().await;
        publisher.take();

        let outcome = trigger
            .handle_event(ChangeEvent::new("inventory-check-scheduled", 0))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            EventOutcome::JobCompleted {
                job: "inventory-check",
                matched: 3
            }
        );
        assert_eq!(publisher.event_types(), vec!["low-stock-alert"]);
        assert!(publisher.events()[0].aggregate.is_empty());
    }

    #[tokio::test]
    async fn publish_failure_is_transient_and_leaves_record_unlatched() {
        let (listener, trigger, store, publisher) = pipelines();
        listener
            .handle_event(ChangeEvent::new("product-draft", 10).with_entity_id("p1"))
            .await
            .unwrap();
        let changes: Vec<ChangeRecord> = store.take_changes().await.collect().await;

        publisher.set_fail(true);
        let report = trigger.handle_changes(changes.clone()).await;
        let (_, error) = report.failures().next().unwrap();
        assert!(error.is_transient());

        publisher.set_fail(false);
        let retry = trigger.handle_changes(changes).await;
        assert!(retry.is_success());
        assert_eq!(publisher.event_types(), vec!["product-draft"]);
    }

    #[tokio::test]
    async fn cdc_without_image_is_permanent_failure() {
        let (_, trigger, _, _) = pipelines();
        let err = trigger
            .handle_event(ChangeEvent::new("product-updated", 1).with_entity_id("p1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingImage { .. }));
        assert!(!err.is_transient());
    }
}
