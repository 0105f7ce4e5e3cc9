//! REST facade library
//!
//! Shapes raw handler values into negotiated, hypermedia-augmented HTTP
//! responses behind a per-client rate limit.

pub mod api;
pub mod core;
pub mod facade;

// Re-export commonly used types
pub use api::ApiServer;
pub use crate::core::{Config, FacadeError};
pub use facade::{Facade, HandlerError, HandlerResult, Reply, RequestContext};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias for the library
pub type Result<T> = anyhow::Result<T>;
