//! Statistics endpoint.

use super::time_range;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use lotkeeper_runtime::LotStatistics;
use serde::Deserialize;

/// Query parameters for statistics.
#[derive(Debug, Default, Deserialize)]
pub struct StatisticsQuery {
    /// Assignments and incidents from this instant
    pub from: Option<DateTime<Utc>>,
    /// Assignments and incidents up to this instant
    pub to: Option<DateTime<Utc>>,
}

/// `GET /reports/statistics[?from=&to=]`.
///
/// # Errors
///
/// 400 for an inverted range; store failures.
pub async fn statistics(
    State(state): State<AppState>,
    Query(query): Query<StatisticsQuery>,
) -> Result<Json<LotStatistics>, AppError> {
    let range = time_range(query.from, query.to)?;
    Ok(Json(state.lot.reports().statistics(range).await?))
}
