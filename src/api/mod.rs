//! HTTP layer
//!
//! This module wires the facade pipeline into an Axum server:
//! - Route registration and the route index used for collection links
//! - Trace id and security header middleware
//! - Demo resource handlers for the binary

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use middleware::{trace_id_middleware, TraceId, TRACE_ID_HEADER};
pub use routes::{RouteIndex, RouteOptions, RoutePattern};
pub use server::ApiServer;
