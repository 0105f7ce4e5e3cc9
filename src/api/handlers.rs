//! Demo routes served by the `rest-facade` binary
//!
//! Handlers return plain JSON values; links, pagination and formats are added
//! by the facade.

use crate::api::models::{City, CreateUserRequest, User};
use crate::api::routes::RouteOptions;
use crate::api::server::ApiServer;
use crate::core::error::ErrorContext;
use crate::facade::{HandlerError, HandlerResult, Reply, RequestContext};
use axum::http::{header, Method};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory users and cities
pub struct DemoStore {
    users: RwLock<Vec<User>>,
    cities: Vec<City>,
}

impl DemoStore {
    pub fn new() -> Self {
        let cities = vec![
            City { id: 1, name: "Lisbon".to_string() },
            City { id: 2, name: "Porto".to_string() },
        ];
        let users = vec![
            User {
                id: 1,
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                city_id: Some(1),
            },
            User {
                id: 2,
                name: "Grace".to_string(),
                email: "grace@example.com".to_string(),
                city_id: None,
            },
        ];

        Self {
            users: RwLock::new(users),
            cities,
        }
    }
}

impl Default for DemoStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the demo routes on `server`
pub fn register_demo_routes(server: &mut ApiServer, store: Arc<DemoStore>) {
    server
        .get("/", |_| index())
        .route(Method::GET, "/health", RouteOptions::without_hypermedia(), |_| health_check())
        .get("/items", |_| list_items());

    let s = store.clone();
    server.get("/users", move |_| list_users(s.clone()));
    let s = store.clone();
    server.get("/users/:id", move |ctx| get_user(s.clone(), ctx));
    let s = store.clone();
    server.post("/users", move |ctx| create_user(s.clone(), ctx));
    let s = store.clone();
    server.get("/cities", move |_| list_cities(s.clone()));
    let s = store.clone();
    server.get("/cities/:id", move |ctx| get_city(s.clone(), ctx));
    let s = store;
    server.route(Method::GET, "/account", RouteOptions::protected(), move |_| {
        get_account(s.clone())
    });
}

/// Handler for GET / - Top-level collections
async fn index() -> HandlerResult {
    Ok(Reply::ok(json!(["/items", "/users", "/cities"])))
}

/// Handler for GET /health
async fn health_check() -> HandlerResult {
    Ok(Reply::ok(json!({
        "status": "ok",
        "version": crate::VERSION,
        "timestamp": chrono::Utc::now().timestamp(),
    })))
}

/// Handler for GET /items - Fifteen numbers, paginated by the facade
async fn list_items() -> HandlerResult {
    Ok(Reply::ok(Value::Array((1..=15).map(Value::from).collect())))
}

async fn list_users(store: Arc<DemoStore>) -> HandlerResult {
    let users = store.users.read().await;
    Ok(Reply::ok(to_value(&*users)?))
}

async fn get_user(store: Arc<DemoStore>, ctx: RequestContext) -> HandlerResult {
    let id = id_param(&ctx)?;
    let users = store.users.read().await;
    let user = users
        .iter()
        .find(|user| user.id == id)
        .ok_or_else(|| HandlerError::not_found("Not Found"))?;

    Ok(Reply::ok(to_value(user)?))
}

/// Handler for POST /users - Accepts JSON or form bodies
async fn create_user(store: Arc<DemoStore>, ctx: RequestContext) -> HandlerResult {
    let body = ctx
        .body
        .clone()
        .ok_or_else(|| HandlerError::bad_request("Request body is required"))?;
    let request: CreateUserRequest = serde_json::from_value(body)
        .map_err(|e| HandlerError::bad_request(format!("Invalid user: {}", e)))?;

    if request.name.trim().is_empty() {
        return Err(HandlerError::bad_request("Name must not be empty"));
    }
    if let Some(city_id) = request.city_id {
        if !store.cities.iter().any(|city| city.id == city_id) {
            return Err(HandlerError::bad_request(format!("Unknown city {}", city_id)));
        }
    }

    let mut users = store.users.write().await;
    let user = User {
        id: users.iter().map(|user| user.id).max().unwrap_or(0) + 1,
        name: request.name,
        email: request.email,
        city_id: request.city_id,
    };
    users.push(user.clone());

    tracing::info!(user_id = user.id, "Created user");

    Ok(Reply::created(to_value(&user)?).with_header(header::LOCATION, &format!("/users/{}", user.id)))
}

async fn list_cities(store: Arc<DemoStore>) -> HandlerResult {
    Ok(Reply::ok(to_value(&store.cities)?))
}

async fn get_city(store: Arc<DemoStore>, ctx: RequestContext) -> HandlerResult {
    let id = id_param(&ctx)?;
    let city = store
        .cities
        .iter()
        .find(|city| city.id == id)
        .ok_or_else(|| HandlerError::not_found("Not Found"))?;

    Ok(Reply::ok(to_value(city)?))
}

/// Handler for GET /account - Served with a private cache policy
async fn get_account(store: Arc<DemoStore>) -> HandlerResult {
    let users = store.users.read().await;
    let user = users
        .first()
        .ok_or_else(|| HandlerError::not_found("Not Found"))?;

    Ok(Reply::ok(to_value(user)?))
}

fn id_param(ctx: &RequestContext) -> Result<u64, HandlerError> {
    ctx.param("id")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| HandlerError::not_found("Not Found"))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, HandlerError> {
    Ok(serde_json::to_value(value).context("Failed to encode resource")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use tower::util::ServiceExt; // For oneshot method

    fn router() -> Router {
        let mut server = ApiServer::new(Config::default());
        register_demo_routes(&mut server, Arc::new(DemoStore::new()));
        server.into_router()
    }

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_index_lists_collections_as_items() {
        let (status, _, body) = call(router(), get("/")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["links"],
            json!([
                {"uri": "/cities", "rel": "item"},
                {"uri": "/items", "rel": "item"},
                {"uri": "/users", "rel": "item"},
            ])
        );
    }

    #[tokio::test]
    async fn test_user_links_to_city() {
        let (status, headers, body) = call(router(), get("/users/1")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Ada");
        assert_eq!(
            headers[header::LINK],
            "</users>; rel=\"collection\", </cities/1>; rel=\"related\""
        );
    }

    #[tokio::test]
    async fn test_user_list_links_each_user() {
        let (_, _, body) = call(router(), get("/users")).await;

        let links = body["links"].as_array().unwrap();
        assert!(links.contains(&json!({"uri": "/", "rel": "collection"})));
        assert!(links.contains(&json!({"uri": "/users/1", "rel": "item"})));
        assert!(links.contains(&json!({"uri": "/users/2", "rel": "item"})));
        assert!(links.contains(&json!({"uri": "/cities/1", "rel": "related"})));
    }

    #[tokio::test]
    async fn test_unknown_user_is_404() {
        let (status, _, body) = call(router(), get("/users/99")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not Found");

        let (status, _, _) = call(router(), get("/users/abc")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_user_then_fetch() {
        let router = router();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/users")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"Linus","email":"linus@example.com","city_id":2}"#))
            .unwrap();

        let (status, headers, body) = call(router.clone(), request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(headers[header::LOCATION], "/users/3");
        assert_eq!(body["data"]["id"], 3);

        let (status, _, body) = call(router, get("/users/3")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], "linus@example.com");
    }

    #[tokio::test]
    async fn test_create_user_rejects_unknown_city() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/users")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=Linus&email=l%40example.com&city_id=42"))
            .unwrap();

        let (status, _, body) = call(router(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unknown city 42");
    }

    #[tokio::test]
    async fn test_health_has_no_links() {
        let (status, headers, body) = call(router(), get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["links"], json!([]));
        assert!(!headers.contains_key(header::LINK));
    }

    #[tokio::test]
    async fn test_account_is_private() {
        let (_, headers, _) = call(router(), get("/account")).await;
        assert_eq!(headers[header::CACHE_CONTROL], "private, no-cache");
    }

    #[tokio::test]
    async fn test_yaml_and_xml_formats() {
        let response = router().oneshot(get("/cities/2?format=application/yaml")).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/yaml");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("name: Porto"));

        let request = Request::builder()
            .uri("/cities/2")
            .header(header::ACCEPT, "application/xml")
            .body(Body::empty())
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("<name>Porto</name>"));
    }
}
