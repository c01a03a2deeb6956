//! Inbound domain event ingest.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use pipeline::{EventOutcome, PipelineError};
use record_store::RecordStore;
use serde::Serialize;
use serde_json::Value;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct EventResult {
    pub index: usize,
    /// What happened to the event, absent if it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether redelivering the event may succeed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transient: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub processed: usize,
    pub failed: usize,
    pub results: Vec<EventResult>,
}

fn describe(outcome: &EventOutcome) -> &'static str {
    match outcome {
        EventOutcome::Materialized { applied: true, .. } => "materialized",
        EventOutcome::Materialized { applied: false, .. } => "stale",
        EventOutcome::Emitted { .. } => "emitted",
        EventOutcome::Suppressed { .. } => "suppressed",
        EventOutcome::JobCompleted { .. } => "job-completed",
        EventOutcome::Dropped { .. } => "dropped",
    }
}

fn to_result(index: usize, result: &Result<EventOutcome, PipelineError>) -> EventResult {
    match result {
        Ok(outcome) => EventResult {
            index,
            outcome: Some(describe(outcome)),
            error: None,
            transient: None,
        },
        Err(e) => EventResult {
            index,
            outcome: None,
            error: Some(e.to_string()),
            transient: Some(e.is_transient()),
        },
    }
}

/// POST /events: run a batch of domain events through the listener.
///
/// Each element is processed on its own. The response is `200` when all
/// succeed, `503` when any failure is worth redelivering and `422` when the
/// failures are permanent.
#[tracing::instrument(skip(state, events), fields(count = events.len()))]
pub async fn ingest<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(events): Json<Vec<Value>>,
) -> (StatusCode, Json<IngestResponse>) {
    let count = events.len();
    let report = state.listener.handle_values(events).await;
    metrics::counter!("api_events_ingested_total").increment(count as u64);

    let status = if report.is_success() {
        StatusCode::OK
    } else if report.failures().any(|(_, e)| e.is_transient()) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };

    let results: Vec<EventResult> = report
        .results
        .iter()
        .enumerate()
        .map(|(i, r)| to_result(i, r))
        .collect();

    (
        status,
        Json(IngestResponse {
            processed: results.len(),
            failed: report.failures().count(),
            results,
        }),
    )
}
