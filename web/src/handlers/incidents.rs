//! Incident endpoints.
//!
//! Staff may report and resolve `manual` and `sensor_fault` incidents; the
//! `lot_full` and `request_rejected` kinds are read-only here.

use super::time_range;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use lotkeeper_core::{Incident, IncidentFilter, IncidentId, IncidentKind, SpaceId};
use serde::Deserialize;

/// Query parameters for listing incidents.
#[derive(Debug, Default, Deserialize)]
pub struct ListIncidentsQuery {
    /// Unresolved only
    #[serde(default)]
    pub open: bool,
    /// Filter by kind
    pub kind: Option<IncidentKind>,
    /// Opened at or after
    pub from: Option<DateTime<Utc>>,
    /// Opened at or before
    pub to: Option<DateTime<Utc>>,
}

/// Request to report an incident.
#[derive(Debug, Deserialize)]
pub struct ReportIncidentRequest {
    /// `manual` or `sensor_fault`
    pub kind: IncidentKind,
    /// Affected space
    pub space_id: Option<i64>,
    /// Free text
    pub note: Option<String>,
}

/// Request to resolve an incident.
#[derive(Debug, Default, Deserialize)]
pub struct ResolveIncidentRequest {
    /// Replaces the incident's note when given
    pub note: Option<String>,
}

/// List incidents, oldest first.
///
/// # Errors
///
/// 400 for an inverted range; store failures.
pub async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<ListIncidentsQuery>,
) -> Result<Json<Vec<Incident>>, AppError> {
    let filter = IncidentFilter {
        open_only: query.open,
        kind: query.kind,
        range: time_range(query.from, query.to)?,
    };
    Ok(Json(state.lot.admin().incidents(filter).await?))
}

/// Get one incident.
///
/// # Errors
///
/// 404 when the incident does not exist.
pub async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Incident>, AppError> {
    Ok(Json(state.lot.admin().incident(IncidentId::new(id)).await?))
}

/// Report a staff incident.
///
/// # Errors
///
/// 422 for system-managed kinds, 404 for an unknown space.
pub async fn report_incident(
    State(state): State<AppState>,
    Json(request): Json<ReportIncidentRequest>,
) -> Result<(StatusCode, Json<Incident>), AppError> {
    let incident = state
        .lot
        .admin()
        .report_incident(request.kind, request.space_id.map(SpaceId::new), request.note)
        .await?;
    Ok((StatusCode::CREATED, Json(incident)))
}

/// Resolve a staff incident. The body is optional.
///
/// # Errors
///
/// 404 when missing, 409 when already resolved, 422 for system-managed kinds.
pub async fn resolve_incident(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<ResolveIncidentRequest>>,
) -> Result<Json<Incident>, AppError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let incident = state
        .lot
        .admin()
        .resolve_incident(IncidentId::new(id), request.note)
        .await?;
    Ok(Json(incident))
}
