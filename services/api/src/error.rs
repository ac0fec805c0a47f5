//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::error;
use vocab_tutor_core::ports::PortError;

use crate::config::ConfigError;
use crate::web::protocol::ErrorResponse;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request itself is unusable.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Port(PortError::NotFound(message)) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            other => {
                error!("Internal Server Error: {}", other);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let not_found = ApiError::from(PortError::NotFound("Session x not found".into()));
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let bad = ApiError::BadRequest("word must contain letters only".into());
        assert_eq!(bad.into_response().status(), StatusCode::BAD_REQUEST);

        let unexpected = ApiError::from(PortError::Unexpected("db down".into()));
        assert_eq!(
            unexpected.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
