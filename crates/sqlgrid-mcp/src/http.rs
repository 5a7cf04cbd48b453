//! HTTP transport: the axum router serving `/mcp` and `/health`.
//!
//! One JSON-RPC envelope per `POST /mcp` call, answered synchronously in
//! the same exchange. `/health` reports process liveness and the current
//! connection count and takes no parameters.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use sqlgrid_pool::ConnectionPool;

use crate::McpHandler;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<ConnectionPool>,
    pub mcp: Arc<McpHandler>,
}

/// Build the server router. The `/mcp` route is mounted only when enabled;
/// the CORS layer is permissive and handles preflight requests itself.
pub fn build_router(
    pool: Arc<ConnectionPool>,
    request_timeout: Duration,
    enable_mcp: bool,
    enable_cors: bool,
) -> Router {
    let state = AppState {
        mcp: Arc::new(McpHandler::new(pool.clone(), request_timeout)),
        pool,
    };

    let mut router = Router::new().route("/health", get(health));
    if enable_mcp {
        router = router.route("/mcp", post(mcp_endpoint));
    }
    let router = router.with_state(state);

    if enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Process health: status flag, live connection count, current timestamp.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
    timestamp: String,
}

/// GET /health
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        connections: state.pool.size().await,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

/// POST /mcp — one JSON-RPC request per call. Every failure mode becomes a
/// well-formed error envelope, so the HTTP status is always 200.
async fn mcp_endpoint(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    Json(state.mcp.handle_raw(&body).await)
}
