use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::info;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

use state_relay::config::{FileConfig, RelayConfig, load_config};
use state_relay::{RelayState, create_routes};

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relay one host's state to any number of WebSocket clients")]
struct Args {
    /// Directory holding config.toml
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Port for the HTTP server (0 for automatic)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Directory of static UI assets
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let default_directive = if args.debug {
        "state_relay=debug,relay=debug,tower_http=debug,info"
    } else {
        "state_relay=info,relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let file_config: FileConfig = load_config(&args.config_dir)
        .extract()
        .context("Failed to load configuration")?;

    let host = args.host.unwrap_or(file_config.server.host);
    let port = args.port.unwrap_or(file_config.server.port);
    let static_dir = args.static_dir.unwrap_or(file_config.server.static_dir);
    let relay_config = RelayConfig::from_file(&file_config.relay);

    info!(
        "Relay config: handshake_timeout={}s, client_buffer={}",
        relay_config.handshake_timeout.as_secs(),
        relay_config.client_buffer
    );

    let state = RelayState::new(relay_config);
    let app = create_routes(state, Some(static_dir.as_path()))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", host, port)
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("State relay listening on http://{}", actual_addr);
    info!("  WS     /ws          - host/client relay endpoint");
    info!("  GET    /health      - relay status");
    info!("  GET    /metrics     - relay counters");

    // Create shutdown signal handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
