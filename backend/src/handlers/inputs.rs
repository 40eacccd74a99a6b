//! HTTP handlers for manual stock inputs and ledger reversals

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use shared::{Capability, StockInput, StockLedgerEntry};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::input::{CreateInputRequest, UpdateInputRequest};
use crate::services::{with_busy_retry, InputService, LedgerService};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputListQuery {
    pub product_id: Option<Uuid>,
}

/// Record a stock input
pub async fn create_input(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateInputRequest>,
) -> AppResult<Json<StockInput>> {
    user.require(Capability::RecordStock)?;
    let service = InputService::new(state.db, state.config.ledger.lock_timeout());
    let recorded = with_busy_retry(&state.config.ledger, || {
        service.create(user.user_id, input.clone())
    })
    .await?;
    Ok(Json(recorded))
}

/// List stock inputs
pub async fn list_inputs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<InputListQuery>,
) -> AppResult<Json<Vec<StockInput>>> {
    user.require(Capability::RecordStock)?;
    let service = InputService::new(state.db, state.config.ledger.lock_timeout());
    let inputs = service.list(query.product_id).await?;
    Ok(Json(inputs))
}

/// Get a stock input
pub async fn get_input(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(input_id): Path<Uuid>,
) -> AppResult<Json<StockInput>> {
    user.require(Capability::RecordStock)?;
    let service = InputService::new(state.db, state.config.ledger.lock_timeout());
    let input = service.get(input_id).await?;
    Ok(Json(input))
}

/// Correct a stock input
pub async fn update_input(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(input_id): Path<Uuid>,
    Json(input): Json<UpdateInputRequest>,
) -> AppResult<Json<StockInput>> {
    user.require(Capability::RecordStock)?;
    let service = InputService::new(state.db, state.config.ledger.lock_timeout());
    let updated = with_busy_retry(&state.config.ledger, || {
        service.update(user.user_id, input_id, input.clone())
    })
    .await?;
    Ok(Json(updated))
}

/// Delete a stock input, reversing its effect
pub async fn delete_input(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(input_id): Path<Uuid>,
) -> AppResult<Json<()>> {
    user.require(Capability::RecordStock)?;
    let service = InputService::new(state.db, state.config.ledger.lock_timeout());
    with_busy_retry(&state.config.ledger, || service.delete(user.user_id, input_id)).await?;
    Ok(Json(()))
}

/// Reverse a ledger entry
pub async fn reverse_entry(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(entry_id): Path<Uuid>,
) -> AppResult<Json<StockLedgerEntry>> {
    user.require(Capability::RecordStock)?;
    let service = LedgerService::new(state.db, state.config.ledger.lock_timeout());
    let reversal =
        with_busy_retry(&state.config.ledger, || service.reverse(entry_id, user.user_id)).await?;
    Ok(Json(reversal))
}
