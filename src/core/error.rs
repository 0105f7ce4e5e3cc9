//! Error type system for the REST facade
//!
//! This module provides:
//! - A single crate-wide error enum with HTTP status mapping
//! - Stable error type names for logs and error envelopes
//! - A context extension trait for wrapping foreign errors

use axum::http::StatusCode;

/// Main error type for the facade pipeline
#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request body could not be parsed as {content_type}: {message}")]
    ParseError {
        content_type: String,
        message: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Render error ({format}): {message}")]
    RenderError { format: String, message: String },

    /// Rejection by the rate limiter; status and message come from configuration
    #[error("{message}")]
    RateLimited { status: StatusCode, message: String },
}

impl FacadeError {
    /// Build a render error for the given format
    pub fn render(format: impl Into<String>, message: impl ToString) -> Self {
        FacadeError::RenderError {
            format: format.into(),
            message: message.to_string(),
        }
    }

    /// Build a body parse error for the given content type
    pub fn parse(content_type: impl Into<String>, message: impl ToString) -> Self {
        FacadeError::ParseError {
            content_type: content_type.into(),
            message: message.to_string(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            FacadeError::InvalidRequest(_) | FacadeError::ParseError { .. } => {
                StatusCode::BAD_REQUEST
            }
            FacadeError::NotFound(_) => StatusCode::NOT_FOUND,
            FacadeError::RateLimited { status, .. } => *status,
            FacadeError::SerializationError(_) | FacadeError::RenderError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error type name used in logs
    pub fn error_type(&self) -> &'static str {
        match self {
            FacadeError::InvalidRequest(_) => "InvalidRequest",
            FacadeError::NotFound(_) => "NotFound",
            FacadeError::ParseError { .. } => "ParseError",
            FacadeError::SerializationError(_) => "SerializationError",
            FacadeError::RenderError { .. } => "RenderError",
            FacadeError::RateLimited { .. } => "RateLimited",
        }
    }
}

/// Result type alias for operations that can fail with FacadeError
pub type Result<T> = std::result::Result<T, FacadeError>;

/// Context extension trait for turning foreign errors into serialization failures
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| FacadeError::SerializationError(format!("{}: {}", context.into(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            FacadeError::InvalidRequest("test".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            FacadeError::parse("application/json", "eof").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            FacadeError::NotFound("test".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            FacadeError::RateLimited {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "slow down".into(),
            }
            .status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            FacadeError::render("text/csv", "bad row").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_types() {
        assert_eq!(FacadeError::render("text/csv", "x").error_type(), "RenderError");
        assert_eq!(FacadeError::parse("text/csv", "x").error_type(), "ParseError");
        assert_eq!(
            FacadeError::NotFound("/x".into()).error_type(),
            "NotFound"
        );
    }

    #[test]
    fn test_rate_limited_message_is_verbatim() {
        let err = FacadeError::RateLimited {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "Too many requests".into(),
        };
        assert_eq!(err.to_string(), "Too many requests");
        assert_eq!(err.error_type(), "RateLimited");
    }

    #[test]
    fn test_render_error_message_names_format() {
        let err = FacadeError::render("application/xml", "unbalanced");
        assert_eq!(err.to_string(), "Render error (application/xml): unbalanced");
    }

    #[test]
    fn test_error_context() {
        let result: std::result::Result<(), std::fmt::Error> = Err(std::fmt::Error);
        let err = result.context("Failed to shape envelope").unwrap_err();

        assert_eq!(err.error_type(), "SerializationError");
        assert!(err.to_string().contains("Failed to shape envelope"));
    }
}
