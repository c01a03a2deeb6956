//! Immutable pipeline configuration.

use std::time::Duration;

use domain::{RetentionPolicy, StatusEventTable};
use projections::AggregateMapper;

use crate::error::ConfigError;
use crate::rules::RuleRegistry;

/// Default per-event time budget.
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Which rule table a pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// Inbound domain events, materialized into the store.
    Listener,
    /// Store changes and timer events, turned into derived events.
    Trigger,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Listener => "listener",
            PipelineKind::Trigger => "trigger",
        }
    }
}

/// Everything an invocation reads and nothing it writes.
///
/// Built once at process start and shared by reference; there is no other
/// state shared between invocations.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub listener: RuleRegistry,
    pub trigger: RuleRegistry,
    pub statuses: StatusEventTable,
    pub retention: RetentionPolicy,
    pub mapper: AggregateMapper,
    /// Region recorded on materialized records.
    pub region: Option<String>,
    pub event_timeout: Duration,
}

impl PipelineConfig {
    /// Configuration for the product catalog.
    pub fn catalog() -> Result<Self, ConfigError> {
        Ok(Self {
            listener: RuleRegistry::listener()?,
            trigger: RuleRegistry::trigger()?,
            statuses: StatusEventTable::catalog()?,
            retention: RetentionPolicy::default(),
            mapper: AggregateMapper::catalog(),
            region: None,
            event_timeout: DEFAULT_EVENT_TIMEOUT,
        })
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = timeout;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Returns the rule table for `kind`.
    pub fn registry(&self, kind: PipelineKind) -> &RuleRegistry {
        match kind {
            PipelineKind::Listener => &self.listener,
            PipelineKind::Trigger => &self.trigger,
        }
    }
}
