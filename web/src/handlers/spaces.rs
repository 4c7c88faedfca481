//! Space endpoints.
//!
//! - `GET /spaces[?state=&class=]` - list spaces by label
//! - `GET /spaces/available` - free spaces
//! - `GET /spaces/:id` - one space
//! - `POST /spaces` - create a space
//! - `PUT /spaces/:id/class` - reservation-class override
//! - `PUT /spaces/:id/release` - a sensor saw the vehicle leave

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use lotkeeper_core::{OccupancyState, ReservationClass, Space, SpaceFilter, SpaceId};
use serde::Deserialize;

/// Query parameters for listing spaces.
#[derive(Debug, Default, Deserialize)]
pub struct ListSpacesQuery {
    /// Filter by occupancy state
    pub state: Option<OccupancyState>,
    /// Filter by reservation class
    pub class: Option<ReservationClass>,
}

/// Request to create a space.
#[derive(Debug, Deserialize)]
pub struct CreateSpaceRequest {
    /// Display label
    pub label: String,
    /// Reservation class; open when omitted
    #[serde(default = "default_class")]
    pub class: ReservationClass,
}

const fn default_class() -> ReservationClass {
    ReservationClass::Open
}

/// Request to change a space's reservation class.
#[derive(Debug, Deserialize)]
pub struct SetClassRequest {
    /// New class
    pub class: ReservationClass,
}

/// List spaces.
///
/// # Errors
///
/// Store failures.
pub async fn list_spaces(
    State(state): State<AppState>,
    Query(query): Query<ListSpacesQuery>,
) -> Result<Json<Vec<Space>>, AppError> {
    let filter = SpaceFilter {
        state: query.state,
        class: query.class,
    };
    Ok(Json(state.lot.registry().list(filter).await?))
}

/// List free spaces.
///
/// # Errors
///
/// Store failures.
pub async fn available_spaces(State(state): State<AppState>) -> Result<Json<Vec<Space>>, AppError> {
    Ok(Json(
        state
            .lot
            .registry()
            .list_by_state(OccupancyState::Free)
            .await?,
    ))
}

/// Get one space.
///
/// # Errors
///
/// 404 when the space does not exist.
pub async fn get_space(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Space>, AppError> {
    Ok(Json(state.lot.registry().get(SpaceId::new(id)).await?))
}

/// Create a space.
///
/// # Errors
///
/// 422 for an invalid label, 409 when the label is taken.
pub async fn create_space(
    State(state): State<AppState>,
    Json(request): Json<CreateSpaceRequest>,
) -> Result<(StatusCode, Json<Space>), AppError> {
    let space = state
        .lot
        .admin()
        .create_space(&request.label, request.class)
        .await?;
    Ok((StatusCode::CREATED, Json(space)))
}

/// Override a space's reservation class.
///
/// # Errors
///
/// 404 when the space does not exist.
pub async fn set_space_class(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<SetClassRequest>,
) -> Result<Json<Space>, AppError> {
    let space = state
        .lot
        .admin()
        .set_reservation_class(SpaceId::new(id), request.class)
        .await?;
    Ok(Json(space))
}

/// Mark a space Free from a sensor, closing its active assignment.
///
/// # Errors
///
/// 404 when the space does not exist.
pub async fn release_space(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Space>, AppError> {
    Ok(Json(state.lot.engine().release_space(SpaceId::new(id)).await?))
}
