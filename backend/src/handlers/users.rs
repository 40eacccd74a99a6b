//! HTTP handlers for staff accounts and login

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{Capability, User};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::user::{LoginResponse, RegisterUserInput, UpdateUserInput};
use crate::services::UserService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login endpoint handler
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let service = UserService::new(state.db, &state.config.jwt);
    let response = service.login(&body.email, &body.password).await?;
    Ok(Json(response))
}

/// Register a staff account
pub async fn register_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<RegisterUserInput>,
) -> AppResult<(StatusCode, Json<User>)> {
    user.require(Capability::ManageUsers)?;
    let service = UserService::new(state.db, &state.config.jwt);
    let created = service.register(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(input): Json<UpdateUserInput>,
) -> AppResult<Json<User>> {
    user.require(Capability::ManageUsers)?;
    let service = UserService::new(state.db, &state.config.jwt);
    let updated = service.update(user.user_id, user_id, input).await?;
    Ok(Json(updated))
}

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<User>>> {
    user.require(Capability::ManageUsers)?;
    let service = UserService::new(state.db, &state.config.jwt);
    let users = service.list().await?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<User>> {
    user.require(Capability::ManageUsers)?;
    let service = UserService::new(state.db, &state.config.jwt);
    let found = service.get(user_id).await?;
    Ok(Json(found))
}

pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<()>> {
    user.require(Capability::ManageUsers)?;
    let service = UserService::new(state.db, &state.config.jwt);
    service.delete(user.user_id, user_id).await?;
    Ok(Json(()))
}
