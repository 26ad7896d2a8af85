//! API error type and the wire error envelope.

use serde::Serialize;
use syncopate_core::{EngineError, ErrorCode};

/// Result type for handler operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// A handler-level error carrying the HTTP status it maps to.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code.
    pub status: u16,
    /// Human-readable message.
    pub message: String,
    /// Stable database error code.
    pub db_code: ErrorCode,
}

impl ApiError {
    /// Creates an error from explicit parts.
    pub fn new(status: u16, db_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            db_code,
        }
    }

    /// A 400 with the given code.
    pub fn bad_request(db_code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(400, db_code, message)
    }

    /// A 404 with the given code.
    pub fn not_found(db_code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(404, db_code, message)
    }

    /// The wire envelope for this error.
    #[must_use]
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: status_text(self.status).to_string(),
            message: self.message.clone(),
            code: self.status,
            db_code: self.db_code,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self {
            status: err.http_status(),
            message: err.to_string(),
            db_code: err.code(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.status, self.db_code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// The error envelope every non-2xx response carries.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// HTTP status text.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// HTTP status code.
    pub code: u16,
    /// Stable database error code.
    pub db_code: ErrorCode,
}

/// Standard reason phrase for the statuses this API produces.
#[must_use]
pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        404 => "Not Found",
        409 => "Conflict",
        500 => "Internal Server Error",
        _ => "Error",
    }
}
