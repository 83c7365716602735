//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::backup::BackupEngine;
use crate::proposal::{ProposalService, SequenceAllocator};
use crate::store::Store;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Backing store (PostgreSQL or in-memory)
    pub store: Arc<dyn Store>,

    /// Proposal numbering and persistence
    pub proposals: ProposalService,

    /// Whole-database export and restore
    pub backups: BackupEngine,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, allocator: SequenceAllocator) -> Self {
        Self {
            proposals: ProposalService::new(store.clone(), allocator),
            backups: BackupEngine::new(store.clone()),
            store,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
