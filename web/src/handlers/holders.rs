//! Reservation holder directory.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use lotkeeper_core::{HolderKey, ReservationHolder};
use serde::Deserialize;

/// Request to register a holder.
#[derive(Debug, Deserialize)]
pub struct RegisterHolderRequest {
    /// Identity key
    pub key: i64,
    /// Display name
    pub name: String,
}

/// Request to rename a holder.
#[derive(Debug, Deserialize)]
pub struct RenameHolderRequest {
    /// New display name
    pub name: String,
}

/// List holders by key.
///
/// # Errors
///
/// Store failures.
pub async fn list_holders(
    State(state): State<AppState>,
) -> Result<Json<Vec<ReservationHolder>>, AppError> {
    Ok(Json(state.lot.admin().holders().await?))
}

/// Register a holder.
///
/// # Errors
///
/// 422 for an invalid key or name, 409 when the key exists.
pub async fn register_holder(
    State(state): State<AppState>,
    Json(request): Json<RegisterHolderRequest>,
) -> Result<(StatusCode, Json<ReservationHolder>), AppError> {
    let holder = state
        .lot
        .admin()
        .register_holder(HolderKey::new(request.key), &request.name)
        .await?;
    Ok((StatusCode::CREATED, Json(holder)))
}

/// Get one holder.
///
/// # Errors
///
/// 404 for an unknown key.
pub async fn get_holder(
    State(state): State<AppState>,
    Path(key): Path<i64>,
) -> Result<Json<ReservationHolder>, AppError> {
    Ok(Json(state.lot.admin().holder(HolderKey::new(key)).await?))
}

/// Rename a holder.
///
/// # Errors
///
/// 404 for an unknown key, 422 for an invalid name.
pub async fn rename_holder(
    State(state): State<AppState>,
    Path(key): Path<i64>,
    Json(request): Json<RenameHolderRequest>,
) -> Result<Json<ReservationHolder>, AppError> {
    let holder = state
        .lot
        .admin()
        .rename_holder(HolderKey::new(key), &request.name)
        .await?;
    Ok(Json(holder))
}

/// Remove a holder. Past assignments keep the key.
///
/// # Errors
///
/// 404 for an unknown key.
pub async fn remove_holder(
    State(state): State<AppState>,
    Path(key): Path<i64>,
) -> Result<Json<ReservationHolder>, AppError> {
    Ok(Json(
        state.lot.admin().remove_holder(HolderKey::new(key)).await?,
    ))
}
