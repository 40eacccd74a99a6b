//! HTTP handlers for partners

use axum::{
    extract::{Path, State},
    Json,
};
use shared::{Capability, Partner};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::partner::CreatePartnerInput;
use crate::services::PartnerService;
use crate::AppState;

pub async fn create_partner(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreatePartnerInput>,
) -> AppResult<Json<Partner>> {
    user.require(Capability::ManagePartners)?;
    let service = PartnerService::new(state.db);
    let partner = service.create(input).await?;
    Ok(Json(partner))
}

pub async fn list_partners(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<Partner>>> {
    user.require(Capability::ManagePartners)?;
    let service = PartnerService::new(state.db);
    let partners = service.list().await?;
    Ok(Json(partners))
}

pub async fn get_partner(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(partner_id): Path<Uuid>,
) -> AppResult<Json<Partner>> {
    user.require(Capability::ManagePartners)?;
    let service = PartnerService::new(state.db);
    let partner = service.get(partner_id).await?;
    Ok(Json(partner))
}

pub async fn delete_partner(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(partner_id): Path<Uuid>,
) -> AppResult<Json<()>> {
    user.require(Capability::ManagePartners)?;
    let service = PartnerService::new(state.db);
    service.delete(partner_id).await?;
    Ok(Json(()))
}
