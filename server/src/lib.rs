//! Sprout Server - reference resource API for the Sprout sync engine.
//!
//! Serves `/plants` and `/notifications` from in-memory tables so the
//! engine's HTTP client can be exercised end to end.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;

use crate::config::Config;
use crate::db::Database;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            db: Database::new_shared(),
            config: Arc::new(config),
        }
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
