//! Partitioned current-state store.
//!
//! Records are keyed by (partition key, sort key). Writes are conditional
//! updates; every applied write is published on a change feed with its
//! before/after images.

pub mod change;
pub mod error;
pub mod memory;
pub mod query;
pub mod record;
pub mod scan;
pub mod store;
pub mod update;

pub use change::{ChangeKind, ChangeRecord};
pub use common::RecordKey;
pub use error::{Result, StoreError};
pub use memory::InMemoryRecordStore;
pub use query::{Cursor, Index, QueryPage, QueryRequest};
pub use record::{Record, attr};
pub use scan::{Filter, ScanRequest};
pub use store::{ChangeFeed, ChangeStream, RecordStore, RecordStoreExt};
pub use update::{Condition, ConditionalUpdate, UpdateOp, UpdateOutcome};
