//! HTTP handlers.

use axum::{Json, extract::State, http::Uri};
use serde::Serialize;

use crate::ws::ConnectionSummary;

use super::error::ApiError;
use super::state::AppState;

/// Health check response: server status and the live connections with their
/// roles. Read-only; consumed by ops tooling.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub clients: Vec<ConnectionSummary>,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        clients: state.hub.snapshot(),
    })
}

/// Fallback for unmatched routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(uri.path().to_string())
}
