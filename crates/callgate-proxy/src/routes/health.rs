//! Liveness endpoint.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Gateway liveness report.
///
/// Does not contact upstream; a reachable gateway with an unreachable
/// upstream still reports `ok`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Base URL requests are forwarded to.
    pub upstream: String,
    /// Live login sessions held by this process.
    pub sessions: usize,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        upstream: state.upstream().to_string(),
        sessions: state.sessions.len().await,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
