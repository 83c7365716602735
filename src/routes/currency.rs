//! Currency route handlers

use crate::error::ApiResult;
use crate::models::Currency;
use crate::state::SharedState;
use axum::{extract::State, Json};

/// All currencies ordered by id
pub async fn list_currencies(State(state): State<SharedState>) -> ApiResult<Json<Vec<Currency>>> {
    let currencies = state.store.list_currencies().await?;
    Ok(Json(currencies))
}
