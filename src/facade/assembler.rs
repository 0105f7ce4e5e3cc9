//! Response assembly
//!
//! Turns a handler outcome into body, status and headers:
//! 1. Build the envelope from the value or the error
//! 2. Derive hypermedia links
//! 3. Shape the envelope with the negotiated serializer
//! 4. Render the wire string
//! 5. Attach Link, rate limit, cache-control and content-type headers
//!
//! Serializer and renderer failures, panics included, become a plain 500.

use crate::core::error::Result;
use crate::facade::envelope::ResponseEnvelope;
use crate::facade::hypermedia::HypermediaDeriver;
use crate::facade::rate_limit::RateDecision;
use crate::facade::render::RenderContext;
use crate::facade::reply::HandlerResult;
use crate::facade::request::RequestContext;
use crate::facade::Facade;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::panic::{self, AssertUnwindSafe};

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// Fully shaped response, ready to be sent
#[derive(Debug, Clone)]
pub struct AssembledResponse {
    pub body: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl IntoResponse for AssembledResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

impl Facade {
    /// Assemble the response for `outcome`
    ///
    /// `hypermedia` is the route's effective setting; `rate` is the decision
    /// made for this request, if rate limiting is enabled.
    pub fn assemble(
        &self,
        request: &RequestContext,
        outcome: HandlerResult,
        hypermedia: bool,
        rate: Option<&RateDecision>,
    ) -> AssembledResponse {
        let (envelope, handler_headers) = match outcome {
            Ok(reply) => (
                ResponseEnvelope::from_value(reply.value, reply.status.as_u16()),
                reply.headers,
            ),
            Err(err) => {
                let status = err.effective_status();
                let message = match (&err.detail, self.settings.stack) {
                    (Some(detail), true) => format!("{}\n{}", err.message, detail),
                    _ => err.message,
                };
                (ResponseEnvelope::from_error(message, status.as_u16()), err.headers)
            }
        };

        let envelope = if hypermedia {
            HypermediaDeriver::new(self.routes.as_ref(), self.settings.page_size)
                .augment(request, envelope)
        } else {
            envelope
        };

        let handler_type = handler_headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let negotiation = self.negotiate(request, handler_type);
        let status = StatusCode::from_u16(envelope.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let rendered = panic::catch_unwind(AssertUnwindSafe(|| -> Result<String> {
            let shaped = (negotiation.serializer)(&envelope)?;
            let ctx = RenderContext {
                request,
                format: &negotiation.format,
                status: envelope.status,
                indent: negotiation.options.indent,
                callback: &negotiation.options.callback,
            };
            (negotiation.renderer)(&ctx, &shaped)
        }));

        let body = match rendered {
            Ok(Ok(body)) => body,
            Ok(Err(err)) => return self.render_failure(request, &negotiation.format, err.to_string(), rate),
            Err(payload) => {
                return self.render_failure(request, &negotiation.format, panic_message(payload), rate)
            }
        };

        let mut headers = handler_headers;
        if let Some(link) = envelope.link_header() {
            if let Ok(value) = HeaderValue::from_str(&link) {
                headers.entry(header::LINK).or_insert(value);
            }
        }
        if let Some(decision) = rate {
            decision.apply_headers(&mut headers);
        }
        self.apply_cache_control(request, &mut headers);
        if let Ok(value) = HeaderValue::from_str(&negotiation.format) {
            headers.insert(header::CONTENT_TYPE, value);
        }

        tracing::debug!(
            status = status.as_u16(),
            format = %negotiation.format,
            links = envelope.links.len(),
            "Response assembled"
        );

        AssembledResponse {
            body: if has_body(status) { body } else { String::new() },
            status,
            headers,
        }
    }

    fn apply_cache_control(&self, request: &RequestContext, headers: &mut HeaderMap) {
        let current = headers
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(&self.settings.cache_control)
            .to_string();

        let value = if request.flags.any() {
            private_cache_control(&current)
        } else {
            current
        };

        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(header::CACHE_CONTROL, value);
        }
    }

    fn render_failure(
        &self,
        request: &RequestContext,
        format: &str,
        detail: String,
        rate: Option<&RateDecision>,
    ) -> AssembledResponse {
        tracing::error!(
            path = %request.path,
            format = %format,
            error = %detail,
            "Failed to render response"
        );

        let body = if self.settings.stack {
            format!("{}\n{}", INTERNAL_ERROR_MESSAGE, detail)
        } else {
            INTERNAL_ERROR_MESSAGE.to_string()
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        if let Some(decision) = rate {
            decision.apply_headers(&mut headers);
        }

        AssembledResponse {
            body,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers,
        }
    }
}

/// Prefix with `private` and drop any `public` directive
fn private_cache_control(value: &str) -> String {
    let rest: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .filter(|d| !d.eq_ignore_ascii_case("public") && !d.eq_ignore_ascii_case("private"))
        .collect();

    if rest.is_empty() {
        "private".to_string()
    } else {
        format!("private, {}", rest.join(", "))
    }
}

fn has_body(status: StatusCode) -> bool {
    status != StatusCode::NO_CONTENT && status != StatusCode::NOT_MODIFIED
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "renderer panicked".to_string()
    }
}
