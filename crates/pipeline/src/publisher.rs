//! Downstream collaborators: derived-event publishing and scan consumption.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use projections::Aggregate;
use record_store::Record;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PublishError;

/// An event synthesized by the pipeline for downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub aggregate: Aggregate,
}

impl DerivedEvent {
    /// Creates an event with a fresh id.
    pub fn new(event_type: impl Into<String>, timestamp: i64, aggregate: Aggregate) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            timestamp,
            aggregate,
        }
    }
}

/// Delivers derived events to the outside world.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DerivedEvent) -> Result<(), PublishError>;
}

/// Consumes the rows matched by a scheduled job's scan.
#[async_trait]
pub trait ScanSink: Send + Sync {
    async fn consume(&self, job: &str, rows: Vec<Record>) -> Result<(), PublishError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct PublisherState {
    events: Vec<DerivedEvent>,
    fail: bool,
}

/// In-memory publisher for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<Mutex<PublisherState>>,
}

impl InMemoryPublisher {
    /// Creates a new in-memory publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail until reset.
    pub fn set_fail(&self, fail: bool) {
        lock(&self.state).fail = fail;
    }

    /// Returns every event published so far.
    pub fn events(&self) -> Vec<DerivedEvent> {
        lock(&self.state).events.clone()
    }

    /// Returns the types of every event published so far.
    pub fn event_types(&self) -> Vec<String> {
        lock(&self.state)
            .events
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Removes and returns every event published so far.
    pub fn take(&self) -> Vec<DerivedEvent> {
        std::mem::take(&mut lock(&self.state).events)
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, event: &DerivedEvent) -> Result<(), PublishError> {
        let mut state = lock(&self.state);
        if state.fail {
            return Err(PublishError::Unavailable("bus rejected event".to_string()));
        }
        state.events.push(event.clone());
        Ok(())
    }
}

/// Publisher that writes each derived event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &DerivedEvent) -> Result<(), PublishError> {
        let aggregate = serde_json::to_string(&event.aggregate)
            .map_err(|e| PublishError::Unavailable(e.to_string()))?;
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            timestamp = event.timestamp,
            %aggregate,
            "derived event published"
        );
        Ok(())
    }
}

/// In-memory scan consumer for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryScanSink {
    batches: Arc<Mutex<Vec<(String, Vec<Record>)>>>,
}

impl InMemoryScanSink {
    /// Creates a new in-memory scan sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every (job, rows) batch consumed so far.
    pub fn batches(&self) -> Vec<(String, Vec<Record>)> {
        lock(&self.batches).clone()
    }
}

#[async_trait]
impl ScanSink for InMemoryScanSink {
    async fn consume(&self, job: &str, rows: Vec<Record>) -> Result<(), PublishError> {
        lock(&self.batches).push((job.to_string(), rows));
        Ok(())
    }
}
