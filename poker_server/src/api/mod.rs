//! HTTP/WebSocket edge for the poker engine.
//!
//! This module exposes the WebSocket connection used by clients to join a
//! room and play, plus a health check for load balancers.
//!
//! # Modules
//!
//! - [`websocket`]: real-time bidirectional communication with the engine's
//!   message-queue session fabric.
//! - [`request_id`]: request-id correlation middleware for logs.
//!
//! # Endpoints
//!
//! - `GET /health` - Server health status
//! - `GET /ws` - WebSocket upgrade; the first client frame must be the
//!   engine's `connect` message (spec §6).

pub mod request_id;
pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use poker_engine::broker::Broker;
use poker_engine::lobby::Lobby;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers and WebSocket connections.
#[derive(Clone)]
pub struct AppState {
    pub lobby: Arc<Lobby>,
    pub broker: Arc<dyn Broker>,
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket::websocket_handler))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
async fn health_check(State(_state): State<AppState>) -> impl IntoResponse {
    let response = json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    (StatusCode::OK, Json(response))
}
