//! Application-level error type.
//!
//! Everything that can go wrong at the HTTP/WebSocket boundary funnels into
//! [`AppError`] so handlers can `?` their way out and still produce a
//! well-formed response. None of these are fatal to the process; a failure
//! on one call never touches other calls.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::core::completion::CompletionError;
use crate::handlers::call::DuplicateSessionError;

/// Application error taxonomy.
#[derive(Debug, Error)]
pub enum AppError {
    /// A second connection arrived for a call id that already has one
    #[error(transparent)]
    DuplicateSession(#[from] DuplicateSessionError),

    /// An event referenced a call id with no live session
    #[error("no live session for call {0}")]
    SessionNotFound(String),

    /// Upstream completion failure
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Result type for application operations.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::DuplicateSession(_) => StatusCode::CONFLICT,
            AppError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Completion(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = axum::Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_session_maps_to_conflict() {
        let err = AppError::DuplicateSession(DuplicateSessionError {
            call_id: "call_1".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_session_not_found_maps_to_not_found() {
        let err = AppError::SessionNotFound("call_2".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.to_string().contains("call_2"));
    }

    #[test]
    fn test_completion_error_maps_to_bad_gateway() {
        let err = AppError::Completion(CompletionError::Timeout("slow upstream".to_string()));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
