//! lanwatch-core: Shared types, runtime settings, and error handling for lanwatch.
//!
//! This crate provides the foundational types used across the workspace:
//! - Host records, statuses and value sources
//! - Scan job, port-scan and latency snapshots
//! - Operator-editable settings (schedules, merge priorities)
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{EnabledSources, PluginPriorityConfig, ScanDefaults, ScheduleConfig, Settings};
pub use error::CoreError;
pub use types::*;
