use axum::{
    Json,
    extract::{State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use maud::{DOCTYPE, Markup, html};

use crate::RelayState;
use crate::connection::handle_socket;
use crate::metrics;

/// WebSocket endpoint - every host and client connects here
pub async fn websocket_handler(
    State(state): State<RelayState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Health check endpoint - returns relay status
pub async fn health_handler(State(state): State<RelayState>) -> impl IntoResponse {
    let host_connected = state.registry.host().await.is_some();
    let clients = state.registry.client_count().await as u64;

    Json(metrics::HealthStatus {
        status: "healthy".to_string(),
        host_connected,
        clients,
        uptime_secs: state.metrics.uptime_secs(),
    })
}

/// Metrics endpoint - returns detailed relay metrics
pub async fn metrics_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Fallback index when no static UI is configured
pub async fn status_page(State(state): State<RelayState>) -> Markup {
    let host_connected = state.registry.host().await.is_some();
    let clients = state.registry.client_count().await;

    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { "State Relay" }
            }
            body {
                h1 { "State Relay" }
                p {
                    "Host: "
                    @if host_connected { "connected" } @else { "waiting" }
                }
                p { "Clients: " (clients) }
                p { "Connect to " code { "/ws" } " and send " code { r#"{"role": "host"}"# } " or " code { r#"{"role": "client"}"# } "." }
            }
        }
    }
}
