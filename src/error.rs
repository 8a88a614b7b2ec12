use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// The error taxonomy exposed across the HTTP control surface.
///
/// Every handler returns `Result<T, AppError>`; no handler matches on
/// error internals to pick its own status code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication required")]
    Auth,

    #[error("insufficient role")]
    Forbidden,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(&'static str),

    #[error("admin accounts cannot be modified")]
    AdminLocked,

    #[error("not found")]
    NotFound,

    #[error("resource unavailable: {0}")]
    Resource(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Auth => (StatusCode::UNAUTHORIZED, json!({ "error": "unauthorized" })),
            AppError::Forbidden => (StatusCode::FORBIDDEN, json!({ "error": "forbidden" })),
            AppError::Validation(msg) => {
                tracing::warn!(%msg, "validation error");
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            AppError::Conflict(kind) => (StatusCode::CONFLICT, json!({ "error": kind })),
            AppError::AdminLocked => (
                StatusCode::FORBIDDEN,
                json!({ "error": "admin_locked" }),
            ),
            AppError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": "not_found" })),
            AppError::Resource(kind) => {
                let status = if *kind == "storage_low" {
                    StatusCode::INSUFFICIENT_STORAGE
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                (status, json!({ "error": kind }))
            }
            AppError::Internal(err) => {
                tracing::error!(error = ?err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal_error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
