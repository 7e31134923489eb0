use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use log::{error, info};

use crate::exporter::Exporter;

/// Builds the HTTP routes: the metrics endpoint and `/health`.
pub fn router(exporter: Arc<Exporter>, endpoint: &str) -> Router {
    Router::new()
        .route(endpoint, get(metrics))
        .route("/health", get(health))
        .with_state(exporter)
}

/// Serves metrics until Ctrl-C is received.
pub async fn serve(exporter: Arc<Exporter>, port: u16, endpoint: &str) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Serving metrics on http://{addr}{endpoint}");

    axum::serve(listener, router(exporter, endpoint))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Exporter stopped");
    Ok(())
}

async fn metrics(State(exporter): State<Arc<Exporter>>) -> Response {
    match exporter.scrape().await {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("Scrape failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
