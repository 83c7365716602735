//! Proposal route handlers

use crate::error::{ApiResult, AppError};
use crate::models::{MessageResponse, Proposal, ProposalListQuery, ProposalRequest};
use crate::proposal::ProposalTotals;
use crate::state::SharedState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use chrono::{Local, NaiveDate};
use tracing::debug;

/// Numbering and default dates follow the server's local calendar
fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn parse_id(raw: &str) -> Result<i32, AppError> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid proposal id: {}", raw)))
}

/// List proposals, newest first
pub async fn list_proposals(
    State(state): State<SharedState>,
    Query(query): Query<ProposalListQuery>,
) -> ApiResult<Json<Vec<Proposal>>> {
    let filter = query.into_filter()?;
    debug!("Listing proposals with {:?}", filter);

    let proposals = state.proposals.list(&filter).await?;
    Ok(Json(proposals))
}

/// Create a proposal and allocate its number
pub async fn create_proposal(
    State(state): State<SharedState>,
    payload: Result<Json<ProposalRequest>, JsonRejection>,
) -> ApiResult<Json<Proposal>> {
    let Json(payload) = payload?;
    let proposal = state.proposals.create(payload, today()).await?;
    Ok(Json(proposal))
}

pub async fn get_proposal(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Proposal>> {
    let proposal = state.proposals.get(parse_id(&id)?).await?;
    Ok(Json(proposal))
}

/// Totals breakdown of a stored proposal
pub async fn get_proposal_totals(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProposalTotals>> {
    let proposal = state.proposals.get(parse_id(&id)?).await?;
    Ok(Json(proposal.totals()?))
}

pub async fn update_proposal(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    payload: Result<Json<ProposalRequest>, JsonRejection>,
) -> ApiResult<Json<Proposal>> {
    let id = parse_id(&id)?;
    let Json(payload) = payload?;
    let proposal = state.proposals.update(id, payload, today()).await?;
    Ok(Json(proposal))
}

pub async fn delete_proposal(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let id = parse_id(&id)?;
    state.proposals.delete(id).await?;
    Ok(Json(MessageResponse::new(format!("Proposal {} deleted", id))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert_eq!(parse_id(" 7 ").unwrap(), 7);
        assert!(matches!(parse_id("0"), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_id("-3"), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_id("abc"), Err(AppError::BadRequest(_))));
    }
}
