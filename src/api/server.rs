//! HTTP Server implementation
//!
//! This module provides the HTTP server using Axum framework with:
//! - Route registration with per-route pipeline options
//! - The facade pipeline (rate limit, body parsing, assembly) around every handler
//! - Request timeouts, CORS, security headers and trace ids
//! - Graceful shutdown handling

use crate::api::middleware::{security_headers_middleware, trace_id_middleware, SecurityHeaders};
use crate::api::routes::{RouteIndex, RouteOptions, RoutePattern};
use crate::core::config::Config;
use crate::core::error::FacadeError;
use crate::facade::{
    AssembledResponse, Facade, HandlerError, HandlerResult, RequestContext, RequestFlags,
};
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, request::Parts, HeaderValue, Method, StatusCode},
    middleware,
    routing::{on, MethodFilter, MethodRouter},
    Router,
};
use futures::future::{BoxFuture, FutureExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Type-erased route handler
pub type BoxHandler = Arc<dyn Fn(RequestContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

struct Endpoint {
    pattern: RoutePattern,
    options: RouteOptions,
    handler: BoxHandler,
}

struct RouteDef {
    method: Method,
    endpoint: Endpoint,
}

/// Shared state handed to every request
struct AppState {
    facade: Facade,
    session_cookie: String,
    body_limit: usize,
}

/// HTTP API Server
pub struct ApiServer {
    config: Config,
    facade: Facade,
    routes: Vec<RouteDef>,
}

impl ApiServer {
    pub fn new(config: Config) -> Self {
        let facade = Facade::from_config(&config);
        Self {
            config,
            facade,
            routes: Vec::new(),
        }
    }

    /// The facade, for registering formats and rate overrides before serving
    pub fn facade_mut(&mut self) -> &mut Facade {
        &mut self.facade
    }

    /// Register a handler for `method` at `path` (`:param` segments allowed)
    pub fn route<H, Fut>(&mut self, method: Method, path: &str, options: RouteOptions, handler: H) -> &mut Self
    where
        H: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: BoxHandler = Arc::new(move |ctx| handler(ctx).boxed());
        self.routes.push(RouteDef {
            method,
            endpoint: Endpoint {
                pattern: RoutePattern::parse(path),
                options,
                handler,
            },
        });
        self
    }

    pub fn get<H, Fut>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.route(Method::GET, path, RouteOptions::default(), handler)
    }

    pub fn post<H, Fut>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.route(Method::POST, path, RouteOptions::default(), handler)
    }

    /// Freeze the facade and build the Axum router with all routes and middleware
    pub fn into_router(self) -> Router {
        let ApiServer {
            config,
            mut facade,
            routes,
        } = self;

        let mut index = RouteIndex::new();
        for def in &routes {
            index.insert(def.method.clone(), def.endpoint.pattern.clone());
        }
        facade.set_routes(Arc::new(index));

        let state = Arc::new(AppState {
            facade,
            session_cookie: config.security.session_cookie.clone(),
            body_limit: config.server.body_limit,
        });

        // Group by path so each path is registered once with all its methods
        let mut by_path: BTreeMap<String, (Vec<Method>, MethodRouter<Arc<AppState>>)> =
            BTreeMap::new();
        for RouteDef { method, endpoint } in routes {
            let filter = match MethodFilter::try_from(method.clone()) {
                Ok(filter) => filter,
                Err(_) => {
                    warn!(method = %method, path = %endpoint.pattern.as_str(), "Unsupported method, route skipped");
                    continue;
                }
            };

            let path = endpoint.pattern.as_str().to_string();
            let endpoint = Arc::new(endpoint);
            let handler = move |State(state): State<Arc<AppState>>, request: Request| {
                let endpoint = endpoint.clone();
                async move { dispatch(state, endpoint, request).await }
            };

            let entry = match by_path.remove(&path) {
                Some((mut methods, existing)) => {
                    methods.push(method);
                    (methods, existing.on(filter, handler))
                }
                None => (vec![method], on(filter, handler)),
            };
            by_path.insert(path, entry);
        }

        let mut router = Router::new();
        for (path, (methods, method_router)) in by_path {
            let allow = methods
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            // Known path, unknown method: still rate limited and rendered
            let method_router = method_router.fallback(
                move |State(state): State<Arc<AppState>>, request: Request| {
                    let error = HandlerError::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
                        .with_header(header::ALLOW, &allow);
                    async move { unmatched(state, request, error).await }
                },
            );
            router = router.route(&path, method_router);
        }

        let security_headers = SecurityHeaders::from_config(&config.security);

        router
            .fallback(not_found)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(middleware::from_fn_with_state(
                        security_headers,
                        security_headers_middleware,
                    ))
                    .layer(middleware::from_fn(trace_id_middleware))
                    .layer(TraceLayer::new_for_http())
                    .layer(Self::build_cors_layer(&config.security.allowed_origins))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.server.request_timeout))),
            )
    }

    /// Build CORS layer from allowed origins configuration
    fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
        use tower_http::cors::Any;

        let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

        if allowed_origins.iter().any(|origin| origin == "*") {
            cors.allow_origin(Any)
        } else {
            let origins: Vec<HeaderValue> = allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
    }

    /// Start the HTTP server and listen for requests
    ///
    /// This method will block until the server is shut down gracefully.
    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let socket_addr: SocketAddr = addr.parse()?;

        info!(
            host = %self.config.server.host,
            port = self.config.server.port,
            routes = self.routes.len(),
            rate_limit = self.config.rate_limit.enabled,
            request_timeout = self.config.server.request_timeout,
            "Starting HTTP server"
        );

        let router = self.into_router();
        let listener = tokio::net::TcpListener::bind(socket_addr).await?;

        info!(addr = %socket_addr, "HTTP server listening");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("HTTP server shut down gracefully");

        Ok(())
    }
}

/// Run one request through rate limiting, body parsing, the handler and assembly
async fn dispatch(state: Arc<AppState>, endpoint: Arc<Endpoint>, request: Request) -> AssembledResponse {
    let (parts, body) = request.into_parts();
    let mut ctx = request_context(&state, &parts, endpoint.options.flags);
    ctx.params = endpoint.pattern.captures(&ctx.path).unwrap_or_default();

    let facade = &state.facade;
    let hypermedia = endpoint
        .options
        .hypermedia
        .unwrap_or(facade.settings().hypermedia);

    let decision = facade.admit(&ctx).await;
    if let Some(rejected) = decision.filter(|d| !d.valid) {
        warn!(
            client = %ctx.client_id(),
            path = %ctx.path,
            limit = rejected.limit,
            reset_at = rejected.reset_at,
            "Rate limit exceeded"
        );
        return facade.assemble(&ctx, Err(facade.rate_limited()), hypermedia, Some(&rejected));
    }

    let outcome = match read_body(&state, &parts, body).await {
        Ok(parsed) => {
            ctx.body = parsed;
            (endpoint.handler)(ctx.clone()).await
        }
        Err(err) => {
            warn!(
                path = %ctx.path,
                error_type = err.error_type(),
                error = %err,
                "Rejected request body"
            );
            Err(HandlerError::from(err))
        }
    };

    facade.assemble(&ctx, outcome, hypermedia, decision.as_ref())
}

/// Unmatched paths still go through the pipeline
async fn not_found(State(state): State<Arc<AppState>>, request: Request) -> AssembledResponse {
    unmatched(state, request, HandlerError::not_found("Not Found")).await
}

async fn unmatched(state: Arc<AppState>, request: Request, error: HandlerError) -> AssembledResponse {
    let (parts, _body) = request.into_parts();
    let ctx = request_context(&state, &parts, RequestFlags::default());
    let facade = &state.facade;
    let hypermedia = facade.settings().hypermedia;

    let decision = facade.admit(&ctx).await;
    let outcome = match decision.filter(|d| !d.valid) {
        Some(_) => Err(facade.rate_limited()),
        None => Err(error),
    };

    facade.assemble(&ctx, outcome, hypermedia, decision.as_ref())
}

fn request_context(state: &AppState, parts: &Parts, flags: RequestFlags) -> RequestContext {
    let remote = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    RequestContext::from_parts(parts, remote, &state.session_cookie).with_flags(flags)
}

async fn read_body(
    state: &AppState,
    parts: &Parts,
    body: Body,
) -> Result<Option<serde_json::Value>, FacadeError> {
    let bytes = axum::body::to_bytes(body, state.body_limit)
        .await
        .map_err(|e| FacadeError::InvalidRequest(format!("Failed to read request body: {}", e)))?;

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    state.facade.parse_body(content_type, &bytes)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Initiating graceful shutdown...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::middleware::TRACE_ID_HEADER;
    use crate::facade::rate_limit::{RATE_LIMIT_HEADER, RATE_REMAINING_HEADER, RATE_RESET_HEADER};
    use crate::facade::Reply;
    use axum::response::Response;
    use serde_json::{json, Value};
    use tower::util::ServiceExt; // For oneshot method

    fn server(config: Config) -> ApiServer {
        let mut server = ApiServer::new(config);
        server
            .get("/items", |_| async {
                Ok(Reply::ok(Value::Array((1..=15).map(Value::from).collect())))
            })
            .get("/users/:id", |ctx: RequestContext| async move {
                let id = ctx.param("id").unwrap_or_default().to_string();
                Ok(Reply::ok(json!({"id": id, "city_id": 3})))
            })
            .get("/users", |_| async { Ok(Reply::ok(json!([]))) })
            .get("/cities", |_| async { Ok(Reply::ok(json!([]))) })
            .post("/users", |ctx: RequestContext| async move {
                match ctx.body {
                    Some(body) => Ok(Reply::created(body)),
                    None => Err(HandlerError::bad_request("Missing body")),
                }
            })
            .route(
                Method::GET,
                "/account",
                RouteOptions::protected(),
                |_| async { Ok(Reply::ok(json!({"name": "me"}))) },
            );
        server
    }

    async fn send(router: Router, request: axum::http::Request<Body>) -> (Response, Value) {
        let response = router.oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (Response::from_parts(parts, Body::empty()), value)
    }

    fn get(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_paginated_route() {
        let router = server(Config::default()).into_router();
        let (response, body) = send(router, get("/items?page=2")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body["data"], json!([6, 7, 8, 9, 10]));

        let link = response.headers()[header::LINK].to_str().unwrap();
        assert!(link.contains("</items?page=1>; rel=\"first\""));
        assert!(link.contains("</items?page=3>; rel=\"last\""));
        assert!(response.headers().contains_key(TRACE_ID_HEADER));
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn test_params_and_related_links() {
        let router = server(Config::default()).into_router();
        let (response, body) = send(router, get("/users/7")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body["data"], json!({"id": "7", "city_id": 3}));
        assert_eq!(
            response.headers()[header::LINK],
            "</users>; rel=\"collection\", </cities/3>; rel=\"related\""
        );
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_third_request() {
        let mut config = Config::default();
        config.rate_limit.enabled = true;
        config.rate_limit.limit = 2;
        let router = server(config).into_router();

        let mut statuses = Vec::new();
        let mut remaining = Vec::new();
        for _ in 0..3 {
            let (response, _) = send(router.clone(), get("/users")).await;
            statuses.push(response.status());
            remaining.push(response.headers()[RATE_REMAINING_HEADER].to_str().unwrap().to_string());
        }

        assert_eq!(
            statuses,
            vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
        );
        assert_eq!(remaining, vec!["1", "0", "0"]);

        let (response, body) = send(router, get("/users")).await;
        assert_eq!(response.headers()[RATE_LIMIT_HEADER], "2");
        assert_eq!(body["error"], "Too many requests");
    }

    #[tokio::test]
    async fn test_post_json_body() {
        let router = server(Config::default()).into_router();
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/users")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"Ada","city_id":1}"#))
            .unwrap();

        let (response, body) = send(router, request).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body["data"], json!({"name": "Ada", "city_id": 1}));
        assert_eq!(body["status"], 201);
    }

    #[tokio::test]
    async fn test_post_form_body() {
        let router = server(Config::default()).into_router();
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/users")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=Ada+Lovelace&email=ada%40example.com&city_id=2"))
            .unwrap();

        let (_, body) = send(router, request).await;
        assert_eq!(
            body["data"],
            json!({"name": "Ada Lovelace", "email": "ada@example.com", "city_id": "2"})
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let router = server(Config::default()).into_router();
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/users")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (response, body) = send(router, request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body["data"], Value::Null);
        assert!(body["error"].as_str().unwrap().contains("application/json"));
    }

    #[tokio::test]
    async fn test_body_over_limit_is_400() {
        let mut config = Config::default();
        config.server.body_limit = 8;
        let router = server(config).into_router();
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/users")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"far too long"}"#))
            .unwrap();

        let (response, _) = send(router, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unmatched_path_goes_through_pipeline() {
        let router = server(Config::default()).into_router();
        let request = axum::http::Request::builder()
            .uri("/nowhere?format=text/plain")
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Not Found");
    }

    #[tokio::test]
    async fn test_unregistered_method_is_rate_limited() {
        let mut config = Config::default();
        config.rate_limit.enabled = true;
        config.rate_limit.limit = 1;
        let router = server(config).into_router();

        let delete = || {
            axum::http::Request::builder()
                .method(Method::DELETE)
                .uri("/items")
                .body(Body::empty())
                .unwrap()
        };

        let (first, body) = send(router.clone(), delete()).await;
        assert_eq!(first.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(first.headers()[header::ALLOW], "GET");
        assert_eq!(first.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(first.headers()[RATE_REMAINING_HEADER], "0");
        assert_eq!(body["error"], "Method Not Allowed");

        for _ in 0..2 {
            let (response, body) = send(router.clone(), delete()).await;
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
            assert_eq!(response.headers()[RATE_REMAINING_HEADER], "0");
            assert_eq!(body["error"], "Too many requests");
        }
    }

    #[tokio::test]
    async fn test_allow_lists_every_registered_method() {
        let router = server(Config::default()).into_router();
        let request = axum::http::Request::builder()
            .method(Method::PUT)
            .uri("/users")
            .body(Body::empty())
            .unwrap();

        let (response, _) = send(router, request).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, POST");
    }

    #[tokio::test]
    async fn test_configured_rejection_status_and_message() {
        let mut config = Config::default();
        config.rate_limit.enabled = true;
        config.rate_limit.limit = 1;
        config.rate_limit.status = 503;
        config.rate_limit.message = "slow down".to_string();
        let router = server(config).into_router();

        let (first, _) = send(router.clone(), get("/items")).await;
        assert_eq!(first.status(), StatusCode::OK);

        let (rejected, body) = send(router, get("/items")).await;
        assert_eq!(rejected.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "slow down");
        assert_eq!(body["status"], 503);
        assert_eq!(body["data"], Value::Null);
        assert_eq!(rejected.headers()[RATE_LIMIT_HEADER], "1");
        assert_eq!(rejected.headers()[RATE_REMAINING_HEADER], "0");
        assert!(rejected.headers().contains_key(RATE_RESET_HEADER));
    }

    #[tokio::test]
    async fn test_format_override_and_accept() {
        let router = server(Config::default()).into_router();
        let request = axum::http::Request::builder()
            .uri("/items?format=text/csv&page_size=20")
            .header(header::ACCEPT, "text/html")
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("value\n1\n2\n"));
    }

    #[tokio::test]
    async fn test_protected_route_is_private() {
        let router = server(Config::default()).into_router();
        let (response, _) = send(router, get("/account")).await;

        assert_eq!(response.headers()[header::CACHE_CONTROL], "private, no-cache");
    }

    #[tokio::test]
    async fn test_session_cookie_identifies_client() {
        let mut config = Config::default();
        config.rate_limit.enabled = true;
        config.rate_limit.limit = 1;
        let router = server(config).into_router();

        let with_cookie = |session: &str| {
            axum::http::Request::builder()
                .uri("/users")
                .header(header::COOKIE, format!("session_id={}", session))
                .body(Body::empty())
                .unwrap()
        };

        let (first, _) = send(router.clone(), with_cookie("a")).await;
        let (second, _) = send(router.clone(), with_cookie("b")).await;
        let (third, _) = send(router, with_cookie("a")).await;

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
