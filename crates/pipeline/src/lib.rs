//! Materialization and change-data-capture pipelines for the catalog.
//!
//! Two pipelines share one immutable [`PipelineConfig`]:
//! - the listener routes inbound domain events to the materializer, which
//!   turns each into a conditional write against the record store
//! - the trigger routes the store's change feed to the CDC assembler, which
//!   rebuilds the aggregate and publishes a derived event, and runs
//!   scheduled jobs on timer events
//!
//! Rules are matched first-come in registration order; unmatched events are
//! dropped without side effects.

pub mod cdc;
pub mod config;
pub mod error;
pub mod handler;
pub mod job;
pub mod materialize;
pub mod publisher;
pub mod rules;

pub use config::{DEFAULT_EVENT_TIMEOUT, PipelineConfig, PipelineKind};
pub use error::{ConfigError, ErrorClass, PipelineError, PublishError, Result};
pub use handler::{BatchReport, EventOutcome, Pipeline};
pub use job::Job;
pub use publisher::{
    DerivedEvent, EventPublisher, InMemoryPublisher, InMemoryScanSink, LogPublisher, ScanSink,
};
pub use rules::{CdcSpec, EventTypePattern, Flavor, MaterializeSpec, Rule, RuleAction, RuleRegistry};
