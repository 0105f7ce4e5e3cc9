//! REST facade demo server
//!
//! Serves a handful of sample resources through the response-shaping pipeline.

use rest_facade::api::handlers::{register_demo_routes, DemoStore};
use rest_facade::{api, core};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (handles CLI args, env vars, and config file)
    let config = match core::config::Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            // Print error to stderr since logging isn't initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let _logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!("Starting REST facade v{}", rest_facade::VERSION);
    info!(
        host = %config.server.host,
        port = config.server.port,
        "Server configuration"
    );
    info!(
        enabled = config.rate_limit.enabled,
        limit = config.rate_limit.limit,
        window = config.rate_limit.window,
        "Rate limit configuration"
    );
    info!(
        default_format = %config.facade.default_format,
        hypermedia = config.hypermedia.enabled,
        page_size = config.hypermedia.page_size,
        "Facade configuration"
    );

    let server_url = format!("http://{}:{}", config.server.host, config.server.port);
    let mut server = api::ApiServer::new(config);
    register_demo_routes(&mut server, Arc::new(DemoStore::new()));

    info!(url = %server_url, "Server ready - starting to serve requests");

    // Blocks until shutdown signal
    server.serve().await?;

    Ok(())
}
