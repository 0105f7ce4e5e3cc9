//! Handler return types
//!
//! Handlers produce raw JSON values; the facade does the shaping. A
//! [`HandlerError`] is carried through the same pipeline as a value, ending up
//! in the envelope's `error` field.

use crate::core::error::FacadeError;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::Value;
use std::fmt;

/// Successful handler outcome
#[derive(Debug, Clone)]
pub struct Reply {
    pub value: Value,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl Reply {
    pub fn ok(value: Value) -> Self {
        Self::with_status(StatusCode::OK, value)
    }

    pub fn created(value: Value) -> Self {
        Self::with_status(StatusCode::CREATED, value)
    }

    pub fn with_status(status: StatusCode, value: Value) -> Self {
        Self {
            value,
            status,
            headers: HeaderMap::new(),
        }
    }

    /// Add a header; invalid values are ignored
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::ok(value)
    }
}

/// Failed handler outcome
#[derive(Debug, Clone)]
pub struct HandlerError {
    pub status: StatusCode,
    pub message: String,
    /// Full error chain, exposed only when stack traces are enabled
    pub detail: Option<String>,
    pub headers: HeaderMap,
}

impl HandlerError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Status used on the wire; anything below 400 is not an error status
    pub fn effective_status(&self) -> StatusCode {
        if self.status.as_u16() < 400 {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            self.status
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status.as_u16())
    }
}

impl std::error::Error for HandlerError {}

impl From<FacadeError> for HandlerError {
    fn from(err: FacadeError) -> Self {
        let message = match &err {
            FacadeError::NotFound(_) => "Not Found".to_string(),
            _ => err.to_string(),
        };
        let error = HandlerError::new(err.status_code(), message);
        // Rejections carry no detail
        if matches!(err, FacadeError::RateLimited { .. }) {
            return error;
        }
        error.with_detail(format!("{:?}", err))
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            .with_detail(format!("{:?}", err))
    }
}

pub type HandlerResult = std::result::Result<Reply, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_constructors() {
        assert_eq!(Reply::ok(json!(1)).status, StatusCode::OK);
        assert_eq!(Reply::created(json!(1)).status, StatusCode::CREATED);

        let reply = Reply::ok(json!(1))
            .with_header(axum::http::header::ETAG, "\"v1\"")
            .with_header(axum::http::header::ETAG, "bad\nvalue");
        assert_eq!(reply.headers[axum::http::header::ETAG], "\"v1\"");
    }

    #[test]
    fn test_effective_status_floors_to_500() {
        assert_eq!(
            HandlerError::new(StatusCode::OK, "odd").effective_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            HandlerError::new(StatusCode::MOVED_PERMANENTLY, "odd").effective_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            HandlerError::not_found("Not Found").effective_status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_from_facade_error() {
        let err: HandlerError = FacadeError::parse("application/json", "expected value").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("application/json"));
        assert!(err.detail.is_some());

        let err: HandlerError = FacadeError::NotFound("/nowhere".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Not Found");
    }

    #[test]
    fn test_from_rate_limited_keeps_configured_status() {
        let err: HandlerError = FacadeError::RateLimited {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "slow down".into(),
        }
        .into();

        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.message, "slow down");
        assert!(err.detail.is_none());
    }

    #[test]
    fn test_from_anyhow_keeps_chain_in_detail() {
        let source = anyhow::anyhow!("disk unavailable").context("loading user");
        let err: HandlerError = source.into();

        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "loading user");
        let detail = err.detail.unwrap();
        assert!(detail.contains("loading user"));
        assert!(detail.contains("disk unavailable"));
    }
}
