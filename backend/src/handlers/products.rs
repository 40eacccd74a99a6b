//! HTTP handlers for the product catalog, scan lookup and stock history

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use shared::{Capability, Product, ProductSummary, StockLedgerEntry};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::catalog::{CreateProductInput, ProductDeletion, UpdateProductInput};
use crate::services::ledger::StockReconciliation;
use crate::services::reporting::day_start;
use crate::services::{BarcodeResolver, LedgerService, ProductService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub search: Option<String>,
}

/// Local-day bounds for a stock history query
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// List active products
pub async fn list_products(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ProductListQuery>,
) -> AppResult<Json<Vec<Product>>> {
    user.require(Capability::ScanProducts)?;
    let service = ProductService::new(state.db);
    let products = service.list(query.search.as_deref()).await?;
    Ok(Json(products))
}

/// Create a product
pub async fn create_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateProductInput>,
) -> AppResult<Json<Product>> {
    user.require(Capability::ManageCatalog)?;
    let service = ProductService::new(state.db);
    let product = service.create(input).await?;
    Ok(Json(product))
}

/// Get a product
pub async fn get_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Product>> {
    user.require(Capability::ScanProducts)?;
    let service = ProductService::new(state.db);
    let product = service.get(product_id).await?;
    Ok(Json(product))
}

/// Update a product
pub async fn update_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> AppResult<Json<Product>> {
    user.require(Capability::ManageCatalog)?;
    let service = ProductService::new(state.db);
    let product = service.update(product_id, input).await?;
    Ok(Json(product))
}

/// Delete a product
pub async fn delete_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ProductDeletion>> {
    user.require(Capability::ManageCatalog)?;
    let service = ProductService::new(state.db);
    let deletion = service.delete(product_id).await?;
    Ok(Json(deletion))
}

/// Resolve a scanned code to a product
pub async fn scan_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(code): Path<String>,
) -> AppResult<Json<ProductSummary>> {
    user.require(Capability::ScanProducts)?;
    let resolver = BarcodeResolver::new(state.db);
    let product = resolver.resolve(&code).await?;
    Ok(Json(product.summary()))
}

/// Ledger history of a product, newest first
pub async fn product_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<StockLedgerEntry>>> {
    user.require(Capability::ScanProducts)?;
    let offset = state.config.reporting.offset();
    let from = query.from.map(|day| day_start(day, offset));
    let to = query
        .to
        .and_then(|day| day.succ_opt())
        .map(|day| day_start(day, offset));

    let service = LedgerService::new(state.db, state.config.ledger.lock_timeout());
    let entries = service.history(product_id, from, to).await?;
    Ok(Json(entries))
}

/// Compare cached stock with the ledger
pub async fn reconcile_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<StockReconciliation>> {
    user.require(Capability::ManageCatalog)?;
    let service = LedgerService::new(state.db, state.config.ledger.lock_timeout());
    let reconciliation = service.reconcile(product_id).await?;
    Ok(Json(reconciliation))
}
