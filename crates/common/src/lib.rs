//! Shared types for the catalog materialization pipeline.

pub mod clock;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use types::{RecordKey, SORT_KEY_SEPARATOR, sort_key_suffix};
