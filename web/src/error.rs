//! Error responses.
//!
//! [`AppError`] carries an HTTP status, a stable error code and a user-facing
//! message. [`LotError`]s convert into it with the status mapping the API
//! documents; store failures become opaque 500s and are logged with their source.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lotkeeper_core::LotError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: &'static str) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST")
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message.into(), "NOT_FOUND")
    }

    /// 409 Conflict.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), "CONFLICT")
    }

    /// 422 Unprocessable Entity.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            message.into(),
            "VALIDATION_ERROR",
        )
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR",
        )
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<LotError> for AppError {
    fn from(err: LotError) -> Self {
        let message = err.to_string();
        match err {
            LotError::NoFreeSpace { .. } => {
                Self::new(StatusCode::CONFLICT, message, "NO_FREE_SPACE")
            }
            LotError::UnknownHolder(_) => {
                Self::new(StatusCode::NOT_FOUND, message, "UNKNOWN_HOLDER")
            }
            LotError::SpaceNotFound(_)
            | LotError::AssignmentNotFound(_)
            | LotError::IncidentNotFound(_)
            | LotError::HolderNotFound(_) => Self::not_found(message),
            LotError::SpaceOccupied(_)
            | LotError::DuplicateLabel(_)
            | LotError::DuplicateHolder(_)
            | LotError::IncidentAlreadyResolved(_) => Self::conflict(message),
            LotError::InvalidLabel(_)
            | LotError::InvalidHolderName(_)
            | LotError::SystemManagedIncident(_) => Self::validation(message),
            LotError::Store(store) => {
                Self::internal("An internal error occurred").with_source(store.into())
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotkeeper_core::{HolderKey, ReservationClass, SpaceId, StoreError};

    #[test]
    fn display_includes_code() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn rejections_map_to_distinct_codes() {
        let full: AppError = LotError::NoFreeSpace {
            class: ReservationClass::Open,
        }
        .into();
        assert_eq!(full.status(), StatusCode::CONFLICT);
        assert_eq!(full.code(), "NO_FREE_SPACE");

        let unknown: AppError = LotError::UnknownHolder(HolderKey::new(7)).into();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
        assert_eq!(unknown.code(), "UNKNOWN_HOLDER");

        let missing: AppError = LotError::SpaceNotFound(SpaceId::new(3)).into();
        assert_eq!(missing.code(), "NOT_FOUND");

        let occupied: AppError = LotError::SpaceOccupied(SpaceId::new(3)).into();
        assert_eq!(occupied.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn store_failures_hide_details() {
        let err: AppError = LotError::Store(StoreError::Database("connection reset".into())).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.to_string().contains("connection reset"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
