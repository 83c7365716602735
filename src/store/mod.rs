//! Storage layer
//!
//! The relational store behind every handler. `PostgresStore` is the
//! production backend; `MemoryStore` enforces the same key and reference
//! rules in-process and backs local development and the test suite.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::backup::{RestorePlan, SnapshotData};
use crate::models::{Currency, Proposal, ProposalDraft, ProposalFilter};
use async_trait::async_trait;
use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Errors raised by a store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unique constraint violated on {table} ({constraint})")]
    UniqueViolation { table: String, constraint: String },

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Database error: {0}")]
    Database(tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        let Some(db_error) = e.as_db_error() else {
            return StoreError::Database(e);
        };

        if *db_error.code() == SqlState::UNIQUE_VIOLATION {
            StoreError::UniqueViolation {
                table: db_error.table().unwrap_or_default().to_string(),
                constraint: db_error.constraint().unwrap_or_default().to_string(),
            }
        } else if *db_error.code() == SqlState::FOREIGN_KEY_VIOLATION {
            StoreError::ForeignKeyViolation(db_error.message().to_string())
        } else {
            StoreError::Database(e)
        }
    }
}

/// Transactional access to the finance tables
#[async_trait]
pub trait Store: Send + Sync {
    /// Every proposal number starting with `prefix`
    async fn proposal_numbers_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Insert a proposal and its items in one transaction
    async fn create_proposal(
        &self,
        proposal_number: &str,
        draft: &ProposalDraft,
    ) -> Result<Proposal, StoreError>;

    async fn get_proposal(&self, id: i32) -> Result<Option<Proposal>, StoreError>;

    async fn list_proposals(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, StoreError>;

    /// Replace parent fields and the whole item set in one transaction.
    /// Returns `None` when the proposal does not exist.
    async fn update_proposal(
        &self,
        id: i32,
        draft: &ProposalDraft,
    ) -> Result<Option<Proposal>, StoreError>;

    /// Returns `false` when nothing was deleted
    async fn delete_proposal(&self, id: i32) -> Result<bool, StoreError>;

    async fn list_currencies(&self) -> Result<Vec<Currency>, StoreError>;

    /// Read every backed-up table as one consistent view
    async fn export_rows(&self) -> Result<SnapshotData, StoreError>;

    /// Run a restore plan atomically: either every step lands or none does
    async fn apply_restore(&self, plan: &RestorePlan) -> Result<(), StoreError>;
}
