//! Proposal service
//!
//! Orchestrates numbering and persistence for the proposal routes.

use crate::error::AppError;
use crate::models::{Proposal, ProposalFilter, ProposalRequest, ProposalStatus};
use crate::proposal::SequenceAllocator;
use crate::store::{Store, StoreError};
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ProposalService {
    store: Arc<dyn Store>,
    allocator: SequenceAllocator,
}

impl ProposalService {
    pub fn new(store: Arc<dyn Store>, allocator: SequenceAllocator) -> Self {
        Self { store, allocator }
    }

    /// Create a proposal. `today` decides the numbering year and the default
    /// proposal date.
    pub async fn create(&self, request: ProposalRequest, today: NaiveDate) -> Result<Proposal, AppError> {
        let (explicit_number, mut draft) = request.into_draft(today)?;
        draft.status = Some(ProposalStatus::Draft);

        let proposal_number = match explicit_number {
            Some(number) => number,
            None => self.allocator.next_number(self.store.as_ref(), today.year()).await?,
        };

        debug!("Creating proposal {} for customer {}", proposal_number, draft.customer_id);

        let proposal = self
            .store
            .create_proposal(&proposal_number, &draft)
            .await
            .map_err(|e| write_error(e, &proposal_number))?;

        info!(
            "Proposal created: {} (id: {}, {} items)",
            proposal.proposal_number,
            proposal.id,
            proposal.items.len()
        );
        Ok(proposal)
    }

    pub async fn get(&self, id: i32) -> Result<Proposal, AppError> {
        self.store
            .get_proposal(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Proposal {} not found", id)))
    }

    pub async fn list(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, AppError> {
        let proposals = self.store.list_proposals(filter).await?;
        debug!("Found {} proposals", proposals.len());
        Ok(proposals)
    }

    /// Replace every field and the whole item set. The proposal number is
    /// never changed by an update.
    pub async fn update(
        &self,
        id: i32,
        request: ProposalRequest,
        today: NaiveDate,
    ) -> Result<Proposal, AppError> {
        let (explicit_number, draft) = request.into_draft(today)?;
        if let Some(number) = explicit_number {
            debug!("Ignoring proposal number {} on update of {}", number, id);
        }

        let proposal = self
            .store
            .update_proposal(id, &draft)
            .await
            .map_err(reference_error)?
            .ok_or_else(|| AppError::NotFound(format!("Proposal {} not found", id)))?;

        info!(
            "Proposal updated: {} (id: {}, {} items)",
            proposal.proposal_number,
            proposal.id,
            proposal.items.len()
        );
        Ok(proposal)
    }

    pub async fn delete(&self, id: i32) -> Result<(), AppError> {
        if !self.store.delete_proposal(id).await? {
            return Err(AppError::NotFound(format!("Proposal {} not found", id)));
        }
        info!("Proposal deleted: {}", id);
        Ok(())
    }
}

/// Creation sees two expected failures: a number taken by a concurrent
/// creation, and a customer/currency that does not exist.
fn write_error(e: StoreError, proposal_number: &str) -> AppError {
    match e {
        e if e.is_unique_violation() => {
            warn!("Proposal number collision on {}", proposal_number);
            AppError::Conflict(format!(
                "Proposal number {} already exists, please retry",
                proposal_number
            ))
        }
        other => reference_error(other),
    }
}

fn reference_error(e: StoreError) -> AppError {
    match e {
        StoreError::ForeignKeyViolation(msg) => {
            AppError::Validation(format!("Unknown customer or currency: {}", msg))
        }
        other => other.into(),
    }
}
