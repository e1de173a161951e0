use axum::{
    extract::rejection::JsonRejection,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use haven_domain::BookingError;
use serde_json::json;

/// Seconds a client should wait before retrying after a rolled-back write.
const RETRY_AFTER_SECS: &str = "5";

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    ServiceUnavailable(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Rolled back, asking client to retry: {}", msg);
                let body = Json(json!({ "error": msg, "retryable": true }));
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    [(header::RETRY_AFTER, RETRY_AFTER_SECS)],
                    body,
                )
                    .into_response();
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            },
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let msg = err.to_string();
        match err {
            BookingError::InvalidRange(_) | BookingError::Validation(_) => AppError::ValidationError(msg),
            BookingError::AvailabilityConflict { .. } | BookingError::InvalidTransition { .. } => {
                AppError::ConflictError(msg)
            }
            BookingError::NotFound(_) | BookingError::PropertyNotFound(_) => AppError::NotFoundError(msg),
            BookingError::Forbidden(_) => AppError::AuthorizationError(msg),
            BookingError::LogUnavailable(_) => AppError::ServiceUnavailable(msg),
            BookingError::Store(_) => AppError::Anyhow(anyhow::Error::new(err).context("booking store failure")),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}
