//! Unified API error handling.
//!
//! Every failure is answered with a fixed status and a JSON body of the form
//! `{"Error": "<message>"}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::dispatcher::Reply;
use crate::auth::AuthError;
use crate::store::StoreError;

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Client errors (4xx)
    ValidationError,
    Forbidden,
    NotFound,
    Conflict,
    MethodNotAllowed,

    // Server errors (5xx)
    InternalError,
    PartialFailure,
    ExternalServiceError,
}

impl ErrorCode {
    /// Get the default HTTP status code for this error code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::BAD_REQUEST,
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::PartialFailure => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ExternalServiceError => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::MethodNotAllowed => "method_not_allowed",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::PartialFailure => "partial_failure",
            ErrorCode::ExternalServiceError => "external_service_error",
        }
    }
}

/// Wire shape of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "Error")]
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    /// HTTP status code (defaults to the code's status)
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
        }
    }

    /// Override the HTTP status, e.g. for lookups that answer 400 instead of 404
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    // -------------------------------------------------------------------------
    // Convenience constructors for common error types
    // -------------------------------------------------------------------------

    /// Malformed or missing input (400)
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn missing_field() -> Self {
        Self::validation("Missing required field")
    }

    pub fn missing_fields() -> Self {
        Self::validation("Missing required fields")
    }

    /// Missing, invalid or expired token (403)
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn invalid_token() -> Self {
        Self::forbidden("Missing required token in header, or token is invalid")
    }

    /// Unknown resource (404)
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Unknown resource, reported as a bad request (400)
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::not_found(message).with_status(StatusCode::BAD_REQUEST)
    }

    /// Duplicate create (400)
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(ErrorCode::MethodNotAllowed, "Method not allowed")
    }

    /// Storage or unexpected failure (500)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// A multi-step operation stopped halfway (500)
    pub fn partial_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PartialFailure, message)
    }

    /// An outside collaborator refused or failed (502)
    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalServiceError, message)
    }

    pub fn body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        Reply::from(self).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

// -------------------------------------------------------------------------
// Conversion implementations for lower layers
// -------------------------------------------------------------------------

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::NotFound { .. } => ApiError::not_found("Resource not found"),
            StoreError::AlreadyExists { .. } => {
                ApiError::conflict("A resource with this identifier already exists")
            }
            StoreError::InvalidKey(_) => ApiError::validation("Invalid identifier"),
            StoreError::Aborted(message) => ApiError::validation(message.clone()),
            StoreError::Corrupt { .. } | StoreError::Serialization(_) | StoreError::Io(_) => {
                error!("Storage error: {}", err);
                ApiError::internal("A storage error occurred")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UserNotFound(_) => ApiError::unknown("Could not find the specified user"),
            AuthError::InvalidCredentials => {
                ApiError::validation("Password did not match the specified user's stored password")
            }
            AuthError::TokenNotFound(_) => ApiError::unknown("Specified token does not exist"),
            AuthError::AlreadyExpired(_) => {
                ApiError::validation("The token has already expired, and cannot be extended")
            }
            AuthError::Store(e) => e.into(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        error!("Serialization error: {}", err);
        ApiError::internal("Could not encode the response")
    }
}
