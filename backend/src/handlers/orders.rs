//! HTTP handlers for orders and their lifecycle

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use shared::{Capability, Order, OrderAction, OrderStatus};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::order::{CreateOrderInput, OrderFilter};
use crate::services::{with_busy_retry, OrderService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub action: OrderAction,
}

/// Place an order, reserving stock for each line
pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateOrderInput>,
) -> AppResult<Json<Order>> {
    user.require(Capability::ManageOrders)?;
    let service = OrderService::new(state.db, state.config.ledger.lock_timeout());
    let order = with_busy_retry(&state.config.ledger, || {
        service.create(user.user_id, input.clone())
    })
    .await?;
    Ok(Json(order))
}

/// List orders
pub async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<Vec<Order>>> {
    user.require(Capability::ManageOrders)?;
    let service = OrderService::new(state.db, state.config.ledger.lock_timeout());
    let orders = service
        .list(OrderFilter {
            status: query.status,
            from: query.from,
            to: query.to,
        })
        .await?;
    Ok(Json(orders))
}

/// Get an order with its items
pub async fn get_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    user.require(Capability::ManageOrders)?;
    let service = OrderService::new(state.db, state.config.ledger.lock_timeout());
    let order = service.get(order_id).await?;
    Ok(Json(order))
}

/// Start, finish or cancel an order
pub async fn transition_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> AppResult<Json<Order>> {
    user.require(Capability::ManageOrders)?;
    let service = OrderService::new(state.db, state.config.ledger.lock_timeout());
    let order = with_busy_retry(&state.config.ledger, || {
        service.transition(user.user_id, order_id, request.action)
    })
    .await?;
    Ok(Json(order))
}

/// Delete an order, cancelling it first if it is still active
pub async fn delete_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<()>> {
    user.require(Capability::ManageOrders)?;
    let service = OrderService::new(state.db, state.config.ledger.lock_timeout());
    with_busy_retry(&state.config.ledger, || service.delete(user.user_id, order_id)).await?;
    Ok(Json(()))
}
