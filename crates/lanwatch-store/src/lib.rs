//! lanwatch-store: host record store.
//!
//! This crate is the single mutation point for host records. The scan
//! orchestrator, the port scanner and the manual-edit API all write through
//! it. Writes are serialized per address, never globally, and the whole
//! store can be snapshotted to a JSON file.

pub mod mutations;
pub mod queries;
pub mod store;

pub use mutations::{ClearSummary, Detection, FieldUpdate, ManualHost, UpsertOutcome};
pub use queries::{HostPage, HostQuery, SortField, SortOrder};
pub use store::{HostStore, StoreConfig, StoreError};
