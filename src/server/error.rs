//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::StudioError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Training error: {0}")]
    Training(String),
}

impl From<StudioError> for ServerError {
    fn from(err: StudioError) -> Self {
        match err {
            StudioError::ValidationError(msg) | StudioError::DataError(msg) => {
                ServerError::BadRequest(msg)
            }
            StudioError::ColumnNotFound(col) => {
                ServerError::BadRequest(format!("Column not found: {col}"))
            }
            StudioError::Io(e) => ServerError::Io(e),
            other => ServerError::Training(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ServerError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
            ServerError::Io(e) => {
                tracing::error!(detail = %e, "IO error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A file system error occurred".to_string(),
                )
            }
            ServerError::Json(_) => (StatusCode::BAD_REQUEST, "Invalid JSON format".to_string()),
            ServerError::Training(msg) => {
                tracing::error!(detail = %msg, "Training error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Training failed. Check server logs for details.".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
