//! Response-shaping pipeline
//!
//! A [`Facade`] owns the format registries, the rate limiter and the route
//! lookup used by hypermedia derivation. It is configured through the
//! `register_*` methods before serving and shared read-only afterwards.

pub mod assembler;
pub mod envelope;
pub mod hypermedia;
pub mod negotiation;
pub mod parse;
pub mod rate_limit;
pub mod registry;
pub mod render;
pub mod reply;
pub mod request;
pub mod serialize;

pub use assembler::AssembledResponse;
pub use envelope::{Link, Rel, ResponseEnvelope};
pub use hypermedia::{HypermediaDeriver, NoRoutes, RouteLookup};
pub use negotiation::{FormatOptions, NegotiationResult, Negotiator};
pub use rate_limit::{RateDecision, RateLimiter, RateState};
pub use registry::FormatRegistry;
pub use render::RenderContext;
pub use reply::{HandlerError, HandlerResult, Reply};
pub use request::{RequestContext, RequestFlags};

use crate::core::config::Config;
use crate::core::error::{FacadeError, Result};
use axum::http::StatusCode;
use serde_json::Value;
use std::sync::Arc;

/// Pipeline settings resolved from configuration
#[derive(Debug, Clone)]
pub struct FacadeSettings {
    pub default_format: String,
    pub indent: usize,
    pub cache_control: String,
    pub hypermedia: bool,
    pub page_size: usize,
    /// Append error chains to error bodies
    pub stack: bool,
    pub rate_limit_status: StatusCode,
    pub rate_limit_message: String,
}

impl Default for FacadeSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl FacadeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_format: config.facade.default_format.clone(),
            indent: config.facade.indent,
            cache_control: config.facade.cache_control.clone(),
            hypermedia: config.hypermedia.enabled,
            page_size: config.hypermedia.page_size,
            stack: config.errors.stack,
            rate_limit_status: StatusCode::from_u16(config.rate_limit.status)
                .unwrap_or(StatusCode::TOO_MANY_REQUESTS),
            rate_limit_message: config.rate_limit.message.clone(),
        }
    }
}

pub struct Facade {
    registry: FormatRegistry,
    limiter: Option<RateLimiter>,
    routes: Arc<dyn RouteLookup>,
    settings: FacadeSettings,
}

impl Facade {
    /// Facade with the built-in formats and no rate limiting
    pub fn new(settings: FacadeSettings) -> Self {
        Self {
            registry: FormatRegistry::with_defaults(),
            limiter: None,
            routes: Arc::new(NoRoutes),
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut facade = Self::new(FacadeSettings::from_config(config));
        if config.rate_limit.enabled {
            facade.limiter = Some(RateLimiter::from_config(&config.rate_limit));
        }
        facade
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn register_parser<F>(&mut self, content_type: &str, parser: F) -> &mut Self
    where
        F: Fn(&[u8]) -> Result<Value> + Send + Sync + 'static,
    {
        self.registry.parsers.insert(content_type, Arc::new(parser));
        self
    }

    pub fn register_renderer<F>(&mut self, content_type: &str, renderer: F) -> &mut Self
    where
        F: Fn(&RenderContext<'_>, &Value) -> Result<String> + Send + Sync + 'static,
    {
        self.registry.renderers.insert(content_type, Arc::new(renderer));
        self
    }

    pub fn register_serializer<F>(&mut self, content_type: &str, serializer: F) -> &mut Self
    where
        F: Fn(&ResponseEnvelope) -> Result<Value> + Send + Sync + 'static,
    {
        self.registry.serializers.insert(content_type, Arc::new(serializer));
        self
    }

    pub fn set_routes(&mut self, routes: Arc<dyn RouteLookup>) -> &mut Self {
        self.routes = routes;
        self
    }

    /// Install a state override on the rate limiter, if one is configured
    pub fn set_rate_override<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&RequestContext, RateState) -> RateState + Send + Sync + 'static,
    {
        if let Some(limiter) = self.limiter.as_mut() {
            limiter.set_override(Arc::new(f));
        }
        self
    }

    pub fn settings(&self) -> &FacadeSettings {
        &self.settings
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_ref()
    }

    pub fn negotiate(&self, request: &RequestContext, handler_type: Option<&str>) -> NegotiationResult {
        Negotiator::new(&self.registry, &self.settings.default_format, self.settings.indent)
            .negotiate(request, handler_type)
    }

    pub fn derive(&self, request: &RequestContext, status: u16, raw: Value) -> ResponseEnvelope {
        HypermediaDeriver::new(self.routes.as_ref(), self.settings.page_size).derive(request, status, raw)
    }

    /// Parse a request body with the parser registered for its content type
    ///
    /// Empty bodies yield `None`. Bodies without a matching parser are passed
    /// through as a JSON string.
    pub fn parse_body(&self, content_type: Option<&str>, bytes: &[u8]) -> Result<Option<Value>> {
        if bytes.is_empty() {
            return Ok(None);
        }

        match content_type.and_then(|ct| self.registry.parsers.get(ct)) {
            Some(parser) => parser(bytes).map(Some),
            None => Ok(Some(Value::String(String::from_utf8_lossy(bytes).into_owned()))),
        }
    }

    /// Run the rate limit check; `None` when rate limiting is disabled
    pub async fn admit(&self, request: &RequestContext) -> Option<RateDecision> {
        match &self.limiter {
            Some(limiter) => Some(limiter.check(request).await),
            None => None,
        }
    }

    /// Error outcome for a request rejected by the rate limiter
    pub fn rate_limited(&self) -> HandlerError {
        FacadeError::RateLimited {
            status: self.settings.rate_limit_status,
            message: self.settings.rate_limit_message.clone(),
        }
        .into()
    }
}
