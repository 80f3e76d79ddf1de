use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tokio::sync::watch;

use harvester::metrics;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    metrics: bool,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        metrics: metrics::metrics_initialized(),
    })
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    metrics::encode_metrics().map_err(|e| {
        tracing::error!(error = %e, "Failed to encode metrics");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

/// Serve `/metrics` and `/health` until `shutdown` flips to true
pub async fn metrics_server(addr: SocketAddr, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics endpoint on {addr}"))?;

    tracing::info!(addr = %addr, "Metrics endpoint listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .context("Metrics server error")?;

    Ok(())
}
