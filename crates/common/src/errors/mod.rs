//! Error types for Inocua services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,

    // Corpus errors (4xxx)
    MalformedArtifact,

    // External service errors (8xxx)
    EmbeddingError,
    EmbeddingTimeout,
    CompletionError,
    CompletionTimeout,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,

            ErrorCode::MalformedArtifact => 4001,

            ErrorCode::EmbeddingError => 8002,
            ErrorCode::EmbeddingTimeout => 8003,
            ErrorCode::CompletionError => 8004,
            ErrorCode::CompletionTimeout => 8005,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    // Corpus errors
    #[error("Malformed embedding artifact: {message}")]
    MalformedArtifact { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError {
        message: String,
        /// Worth another attempt (timeouts, 429, 5xx, connection failures)
        transient: bool,
    },

    #[error("Embedding timeout after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    #[error("Completion service error: {message}")]
    CompletionError { message: String, transient: bool },

    #[error("Completion timeout after {timeout_ms}ms")]
    CompletionTimeout { timeout_ms: u64 },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::MalformedArtifact { .. } => ErrorCode::MalformedArtifact,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::EmbeddingTimeout { .. } => ErrorCode::EmbeddingTimeout,
            AppError::CompletionError { .. } => ErrorCode::CompletionError,
            AppError::CompletionTimeout { .. } => ErrorCode::CompletionTimeout,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::MissingField { .. } => StatusCode::BAD_REQUEST,

            // 500 Internal Server Error
            AppError::MalformedArtifact { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::EmbeddingError { .. } | AppError::CompletionError { .. } => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            AppError::EmbeddingTimeout { .. } | AppError::CompletionTimeout { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
        }
    }

    /// Whether a retry of the same external call could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::EmbeddingTimeout { .. } | AppError::CompletionTimeout { .. } => true,
            AppError::EmbeddingError { transient, .. }
            | AppError::CompletionError { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Whether an upstream HTTP status is worth retrying
pub(crate) fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::MalformedArtifact {
            message: "records missing".into(),
        };
        assert_eq!(err.code(), ErrorCode::MalformedArtifact);
        assert_eq!(err.code().as_code(), 4001);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "message too long".into(),
            field: Some("message".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::EmbeddingTimeout { timeout_ms: 100 }.is_transient());
        assert!(AppError::CompletionError {
            message: "503".into(),
            transient: true
        }
        .is_transient());
        assert!(!AppError::CompletionError {
            message: "401".into(),
            transient: false
        }
        .is_transient());
        assert!(!AppError::Internal {
            message: "boom".into()
        }
        .is_transient());
    }

    #[test]
    fn test_provider_errors_are_gateway_failures() {
        let err = AppError::CompletionTimeout { timeout_ms: 30_000 };
        assert_eq!(err.code(), ErrorCode::CompletionTimeout);
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let err = AppError::EmbeddingError {
            message: "503".into(),
            transient: true,
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_transient_status() {
        assert!(is_transient_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(reqwest::StatusCode::UNAUTHORIZED));
    }
}
