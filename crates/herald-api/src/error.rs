//! API error responses.
//!
//! Every error is rendered as `{"error": {"code", "message"}}` with a status
//! derived from the error kind. Codes follow the core error taxonomy; request
//! shape problems use `E1000`.

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use herald_core::CoreError;
use serde::Serialize;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code from the taxonomy (E1000-E3002)
    pub code: String,
    /// Human-readable error description
    pub message: String,
}

/// Error returned by handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Malformed request body or path.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, code: "E1000", message: message.into() }
    }

    /// HTTP status of this error.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Error code of this error.
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        let status = match error {
            CoreError::InvalidEndpoint { .. } | CoreError::InvalidEventType { .. } => {
                StatusCode::BAD_REQUEST
            },
            CoreError::EndpointNotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::QueueFull { .. } | CoreError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
        };

        Self { status, code: error.code(), message: error.to_string() }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorDetail { code: self.code.to_string(), message: self.message },
        };

        (self.status, Json(body)).into_response()
    }
}
