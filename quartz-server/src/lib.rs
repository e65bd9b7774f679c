//! Quartz Server — HTTP surface over the blend-index pipeline.
//!
//! `GET /{symbol}` resolves a preset token and returns the index as JSON.
//! The core pipeline is synchronous (blocking fetch + filesystem), so each
//! request runs it on tokio's blocking pool.

pub mod error;

use axum::error_handling::HandleErrorLayer;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{BoxError, Router};
use quartz_core::{IndexError, IndexService, ResolveError, ServiceConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

pub use error::ApiError;

/// Shared application state, passed to handlers via `axum::extract::State`.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IndexService>,
}

impl AppState {
    pub fn new(service: Arc<IndexService>) -> Self {
        Self { service }
    }
}

/// Assemble the router with tracing and an overall per-request timeout.
///
/// A request that outlives `request_timeout` is answered with 504.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(missing_symbol))
        .route("/health", get(health))
        .route("/:symbol", get(blend_index))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                    ApiError::from_layer(err, request_timeout)
                }))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Install the global tracing subscriber (`RUST_LOG`, default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Bind and serve until Ctrl-C or SIGTERM.
pub async fn serve(config: &ServiceConfig, service: Arc<IndexService>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {}:{}: {e}", config.bind, config.port))?;

    let app = build_router(AppState::new(service), config.request_timeout);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Quartz index service listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn blend_index(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Response, ApiError> {
    let service = Arc::clone(&state.service);
    let body = tokio::task::spawn_blocking(move || service.handle_json(&symbol)).await??;

    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        body,
    )
        .into_response())
}

async fn missing_symbol() -> ApiError {
    ApiError::Index(IndexError::InvalidSymbol(ResolveError::EmptyToken))
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, gracefully stopping…");
}
