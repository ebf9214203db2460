use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::storage::StorageError;

/// Failure of a route, translated into an HTTP response at the boundary
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Serialize)]
pub struct NotFoundResponse {
    pub message: String,
    pub status: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(_) => {
                tracing::debug!("Unauthorized");
                (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
            }
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(NotFoundResponse {
                    message,
                    status: StatusCode::NOT_FOUND.as_u16(),
                }),
            )
                .into_response(),
            ApiError::Storage(err) => {
                tracing::error!(error = ?err, "storage operation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
