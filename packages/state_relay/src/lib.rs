// Library interface for state_relay
// Exposes the relay core and a router that can be served or embedded

pub mod classifier;
pub mod config;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod session;

pub use config::RelayConfig;
pub use metrics::RelayMetrics;
pub use protocol::{Role, ServerNotice};
pub use registry::ConnectionRegistry;

use axum::{Router, routing::get};
use std::path::Path;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::info;

/// Shared state handed to every connection.
#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<ConnectionRegistry>,
    pub metrics: Arc<RelayMetrics>,
    pub config: Arc<RelayConfig>,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            metrics: Arc::new(RelayMetrics::new()),
            config: Arc::new(config),
        }
    }
}

/// Build the relay's HTTP surface: the `/ws` endpoint, health and metrics,
/// and static assets from `static_dir` when it exists.
pub fn create_routes(state: RelayState, static_dir: Option<&Path>) -> Router {
    let app = Router::new()
        .route("/ws", get(handlers::websocket_handler))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler));

    let app = match static_dir.filter(|dir| dir.is_dir()) {
        Some(dir) => {
            info!("Serving static assets from {}", dir.display());
            app.fallback_service(ServeDir::new(dir))
        }
        None => app.route("/", get(handlers::status_page)),
    };

    app.with_state(state)
}
