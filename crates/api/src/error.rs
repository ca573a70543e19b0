use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use autoscuola_core::error::CoreError;
use autoscuola_engine::EngineError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`EngineError`] for domain/database errors and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON error
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain or database error from the engine.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A database error reached the handler directly.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        AppError::Engine(EngineError::Core(err))
    }
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Engine(EngineError::Core(core)) => classify_core_error(core),
            AppError::Engine(EngineError::Database(err)) | AppError::Database(err) => {
                classify_sqlx_error(err)
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Map domain errors onto response codes. Caller errors surface with a
/// specific code; retryable/expected engine outcomes never reach here.
fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::SlotConflict { .. } => {
            (StatusCode::CONFLICT, "SLOT_CONFLICT", err.to_string())
        }
        CoreError::InvalidResource { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_RESOURCE",
            err.to_string(),
        ),
        CoreError::NotRepositionable(msg) => {
            (StatusCode::CONFLICT, "NOT_REPOSITIONABLE", msg.clone())
        }
        CoreError::BookingBlocked { .. } => {
            (StatusCode::CONFLICT, "BOOKING_BLOCKED", err.to_string())
        }
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`)
///   map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscuola_core::types::OwnerType;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn caller_errors_map_to_specific_statuses() {
        assert_eq!(
            status_of(CoreError::SlotConflict { owner_type: OwnerType::Vehicle, owner_id: 3 }.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                CoreError::InvalidResource { owner_type: OwnerType::Instructor, owner_id: 3 }
                    .into()
            ),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(CoreError::NotRepositionable("already started".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CoreError::BookingBlocked { student_id: 9 }.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CoreError::NotFound { entity: "Appointment", id: 1 }.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CoreError::Validation("bad".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }
}
