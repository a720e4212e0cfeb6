use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// How notifications are delivered (`queued`, `inline` or `dev`).
    pub delivery_mode: &'static str,
    /// Whether the dev mailbox is mounted.
    pub mailbox: bool,
}

/// GET /health -- returns service status and the active delivery mode.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        delivery_mode: state.delivery_mode.as_str(),
        mailbox: state.mailbox.is_some(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
