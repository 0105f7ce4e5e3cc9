//! Content negotiation
//!
//! Candidates come from the `format` query parameter when present, otherwise
//! from the `Accept` header, with any handler-set content type tried last. The
//! first candidate with a registered renderer wins; serializers are looked up
//! the same way but independently.

use crate::facade::registry::{base_type, FormatRegistry, RendererFn, SerializerFn};
use crate::facade::request::RequestContext;
use crate::facade::{render, serialize};
use axum::http::header;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

lazy_static! {
    static ref INDENT: Regex = Regex::new(r"indent=(\d+)").unwrap();
    static ref CALLBACK_NAME: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$").unwrap();
}

pub const DEFAULT_CALLBACK: &str = "callback";

/// Format-specific options extracted from the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    pub indent: usize,
    pub callback: String,
}

/// Renderer and serializer chosen for one request
#[derive(Clone)]
pub struct NegotiationResult {
    /// Resolved content type, used verbatim as the `content-type` header
    pub format: String,
    pub renderer: RendererFn,
    pub serializer: SerializerFn,
    pub options: FormatOptions,
}

impl std::fmt::Debug for NegotiationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiationResult")
            .field("format", &self.format)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

pub struct Negotiator<'a> {
    registry: &'a FormatRegistry,
    default_format: &'a str,
    default_indent: usize,
}

impl<'a> Negotiator<'a> {
    pub fn new(registry: &'a FormatRegistry, default_format: &'a str, default_indent: usize) -> Self {
        Self {
            registry,
            default_format,
            default_indent,
        }
    }

    pub fn negotiate(&self, request: &RequestContext, handler_type: Option<&str>) -> NegotiationResult {
        let source = format_source(request);
        let mut candidates: Vec<&str> = source
            .map(|s| s.split(',').map(base_type).filter(|c| !c.is_empty()).collect())
            .unwrap_or_default();
        if let Some(handler_type) = handler_type {
            candidates.push(base_type(handler_type));
        }

        let (format, renderer) = candidates
            .iter()
            .find_map(|c| self.registry.renderers.get(c).map(|r| (c.to_string(), r)))
            .unwrap_or_else(|| {
                let renderer = self
                    .registry
                    .renderers
                    .get(self.default_format)
                    .unwrap_or_else(|| Arc::new(render::json) as RendererFn);
                (self.default_format.to_string(), renderer)
            });

        let serializer = candidates
            .iter()
            .find_map(|c| self.registry.serializers.get(c))
            .or_else(|| self.registry.serializers.get(self.default_format))
            .unwrap_or_else(|| Arc::new(serialize::custom) as SerializerFn);

        let options = FormatOptions {
            indent: source
                .and_then(|s| INDENT.captures(s))
                .and_then(|caps| caps[1].parse().ok())
                .unwrap_or(self.default_indent),
            callback: request
                .query_param("callback")
                .filter(|name| CALLBACK_NAME.is_match(name))
                .unwrap_or(DEFAULT_CALLBACK)
                .to_string(),
        };

        tracing::debug!(
            format = %format,
            indent = options.indent,
            candidates = ?candidates,
            "Negotiated response format"
        );

        NegotiationResult {
            format,
            renderer,
            serializer,
            options,
        }
    }
}

/// The `format` query override if present, else the `Accept` header
fn format_source(request: &RequestContext) -> Option<&str> {
    request
        .query_param("format")
        .filter(|f| !f.trim().is_empty())
        .or_else(|| request.header(header::ACCEPT.as_str()))
}
