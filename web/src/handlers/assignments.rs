//! Assignment endpoints.
//!
//! - `POST /assignments` - request a space (`{"holder": 12345678}` for the reserved pool)
//! - `GET /assignments/active` - assignments still holding a space
//! - `GET /assignments/:id` - one assignment
//! - `PUT /assignments/:id/release` - give the space back

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use lotkeeper_core::{Assignment, AssignmentId, AssignmentRequest, HolderKey};
use lotkeeper_runtime::ReleaseOutcome;
use serde::Deserialize;

/// Request body for a new assignment.
#[derive(Debug, Default, Deserialize)]
pub struct RequestAssignmentBody {
    /// Reservation holder key; omit for an open-class space
    #[serde(default)]
    pub holder: Option<i64>,
}

impl From<RequestAssignmentBody> for AssignmentRequest {
    fn from(body: RequestAssignmentBody) -> Self {
        body.holder.map(HolderKey::new).into()
    }
}

/// Request a space.
///
/// # Errors
///
/// 409 `NO_FREE_SPACE` when the pool is exhausted, 404 `UNKNOWN_HOLDER` for an
/// unregistered holder key.
pub async fn request_assignment(
    State(state): State<AppState>,
    Json(body): Json<RequestAssignmentBody>,
) -> Result<(StatusCode, Json<Assignment>), AppError> {
    let assignment = state.lot.engine().request_assignment(body.into()).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// List active assignments.
///
/// # Errors
///
/// Store failures.
pub async fn active_assignments(
    State(state): State<AppState>,
) -> Result<Json<Vec<Assignment>>, AppError> {
    Ok(Json(state.lot.engine().active_assignments().await?))
}

/// Get one assignment.
///
/// # Errors
///
/// 404 when the assignment does not exist.
pub async fn get_assignment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Assignment>, AppError> {
    Ok(Json(
        state
            .lot
            .engine()
            .assignment(AssignmentId::new(id))
            .await?,
    ))
}

/// Release an assignment. Releasing twice answers `already_released`.
///
/// # Errors
///
/// 404 when the assignment does not exist.
pub async fn release_assignment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ReleaseOutcome>, AppError> {
    Ok(Json(
        state
            .lot
            .engine()
            .release_assignment(AssignmentId::new(id))
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_without_holder_is_an_open_request() {
        let body: RequestAssignmentBody = serde_json::from_str("{}").unwrap_or_default();
        assert_eq!(AssignmentRequest::from(body), AssignmentRequest::Open);

        let body = RequestAssignmentBody { holder: Some(42) };
        assert_eq!(
            AssignmentRequest::from(body),
            AssignmentRequest::Reserved {
                holder: HolderKey::new(42)
            }
        );
    }
}
