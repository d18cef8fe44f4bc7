use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use certgen_core::error::CoreError;
use certgen_pipeline::PipelineError;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain and pipeline errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `certgen_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A generation pipeline failure.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A resource addressed by something other than a numeric id.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),

            // --- Pipeline errors ---
            AppError::Pipeline(pipeline) => match pipeline {
                PipelineError::EventNotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", pipeline.to_string())
                }
                PipelineError::UnsupportedAction(_)
                | PipelineError::MissingTemplate(_)
                | PipelineError::NoValidParticipants(_) => (
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    pipeline.to_string(),
                ),
                PipelineError::SerialAllocationExhausted { .. } => {
                    tracing::warn!(error = %pipeline, "Serial allocation exhausted");
                    (StatusCode::CONFLICT, "SERIAL_CONFLICT", pipeline.to_string())
                }
                PipelineError::JobNotSettled { .. } => {
                    tracing::warn!(error = %pipeline, "Render job not settled");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "JOB_NOT_SETTLED",
                        pipeline.to_string(),
                    )
                }
                PipelineError::Core(core) => classify_core_error(core),
                PipelineError::Transport(err) => {
                    tracing::error!(error = %err, "Job transport error");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "TRANSPORT_UNAVAILABLE",
                        "The render queue is unavailable, try again later".to_string(),
                    )
                }
                PipelineError::Database(err) => classify_sqlx_error(err),
            },

            AppError::Database(err) => classify_sqlx_error(err),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::InvalidTransition { .. } => (
            StatusCode::CONFLICT,
            "INVALID_TRANSITION",
            core.to_string(),
        ),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal_error()
        }
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
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
            internal_error()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal_error()
        }
    }
}

fn internal_error() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use certgen_core::document_status::DocumentStatus;
    use certgen_transport::TransportError;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_validation_failures_are_bad_requests() {
        for err in [
            PipelineError::UnsupportedAction("send_emails".into()),
            PipelineError::MissingTemplate(1),
            PipelineError::NoValidParticipants(1),
        ] {
            assert_eq!(status_of(err.into()), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_unknown_event_is_not_found() {
        assert_eq!(
            status_of(PipelineError::EventNotFound(9).into()),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_rejected_transition_is_conflict() {
        let err = PipelineError::Core(CoreError::InvalidTransition {
            from: DocumentStatus::PdfPending,
            to: DocumentStatus::Renew,
        });
        assert_eq!(status_of(err.into()), StatusCode::CONFLICT);
    }

    #[test]
    fn test_transport_failure_is_service_unavailable() {
        let err = PipelineError::Transport(TransportError::Unavailable("down".into()));
        assert_eq!(status_of(err.into()), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_row_not_found_is_not_found() {
        assert_eq!(
            status_of(AppError::Database(sqlx::Error::RowNotFound)),
            StatusCode::NOT_FOUND
        );
    }
}
