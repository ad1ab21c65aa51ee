use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// Application-level errors surfaced as HTTP responses.
///
/// Domain rejections (invalid key, device mismatch, ...) are NOT errors;
/// they are values carried in the 401 response envelope by the license
/// handlers. These variants cover request/infrastructure failures only.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("storage pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            // Internal detail stays in the logs, not the response body
            AppError::Internal(_) | AppError::Db(_) | AppError::Pool(_) | AppError::Json(_) => {
                tracing::error!(error = %self, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
