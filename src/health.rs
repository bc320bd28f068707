//! Status endpoint: `GET /health`.
//!
//! Reports `healthy` (HTTP 200) while the gateway is connected and the last
//! heartbeat ack is recent, `unhealthy` (HTTP 503) otherwise.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::gateway::GatewayStatus;

/// Oldest heartbeat ack still considered healthy.
pub const MAX_HEARTBEAT_ACK_AGE: Duration = Duration::from_millis(120_000);

/// Default port for the status endpoint.
pub const DEFAULT_HEALTH_PORT: u16 = 3000;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

async fn health(State(status): State<Arc<GatewayStatus>>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = status
        .snapshot()
        .is_healthy(Instant::now(), MAX_HEARTBEAT_ACK_AGE);
    let (code, label) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };
    let body = HealthResponse {
        status: label,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    (code, Json(body))
}

/// Router exposing `GET /health` over the given gateway status.
pub fn router(status: Arc<GatewayStatus>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(status)
}

/// Serves the status endpoint until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns the IO error if the server fails while accepting connections.
pub async fn serve(
    listener: TcpListener,
    status: Arc<GatewayStatus>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "status endpoint listening");
    }
    axum::serve(listener, router(status))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
