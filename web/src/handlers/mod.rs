//! HTTP request handlers, grouped by resource.

pub mod assignments;
pub mod health;
pub mod holders;
pub mod incidents;
pub mod reports;
pub mod spaces;
pub mod websocket;

use crate::error::AppError;
use chrono::{DateTime, Utc};
use lotkeeper_core::TimeRange;

/// Builds a range from optional `from`/`to` query bounds. `None` when both are absent.
///
/// # Errors
///
/// 400 when `from` is after `to`.
pub(crate) fn time_range(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<Option<TimeRange>, AppError> {
    match (from, to) {
        (None, None) => Ok(None),
        (Some(from), Some(to)) if from > to => Err(AppError::bad_request(format!(
            "'from' ({from}) is after 'to' ({to})"
        ))),
        (from, to) => Ok(Some(TimeRange::new(
            from.unwrap_or(DateTime::<Utc>::MIN_UTC),
            to.unwrap_or(DateTime::<Utc>::MAX_UTC),
        ))),
    }
}
