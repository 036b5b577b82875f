//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use rickybot_types::error::{CookieError, SessionError};
use rickybot_types::session::SessionId;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors from a session engine.
    Session(SessionError),
    /// No valid session cookie on the request.
    MissingSession,
    /// The cookie names a session the registry does not hold.
    SessionNotFound(SessionId),
    /// Validation error.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::Session(e)
    }
}

impl From<CookieError> for AppError {
    fn from(e: CookieError) -> Self {
        AppError::Internal(format!("cookie signing failed: {e}"))
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Session(e @ SessionError::QueueFull { .. }) => {
                (StatusCode::TOO_MANY_REQUESTS, "QUEUE_FULL", e.to_string())
            }
            AppError::Session(e @ SessionError::ShutDown) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SESSION_SHUT_DOWN", e.to_string())
            }
            AppError::MissingSession => (
                StatusCode::BAD_REQUEST,
                "MISSING_SESSION",
                "Missing or invalid session cookie".to_string(),
            ),
            AppError::SessionNotFound(id) => (
                StatusCode::NOT_FOUND,
                "SESSION_NOT_FOUND",
                format!("Session '{id}' not found"),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, %message, "Request failed");
        }

        let body = json!({
            "data": null,
            "meta": {
                "request_id": "",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
