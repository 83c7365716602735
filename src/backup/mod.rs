//! Backup and restore
//!
//! Whole-database export to a JSON snapshot, and atomic wipe-and-reload
//! restore in foreign-key order.

mod engine;
mod graph;
mod snapshot;

pub use engine::{BackupEngine, BackupError, RestorePlan, RestoreStep};
pub use graph::{restore_order, CycleError, Entity, OnDelete};
pub use snapshot::{RestoreRequest, Row, Snapshot, SnapshotData, SnapshotMetadata};
