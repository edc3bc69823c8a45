//! Health check endpoint.
//!
//! Unauthenticated; clients use it as their reachability probe.

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub plants: usize,
    pub notifications: usize,
    pub auth_required: bool,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        plants: state.db.plants.len(),
        notifications: state.db.notifications.len(),
        auth_required: state.config.api_token.is_some(),
    })
}

/// Root handler.
async fn root() -> &'static str {
    "Sprout Resource API"
}
