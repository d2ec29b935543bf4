//! API route definitions.
//!
//! Defines all API routes and their associated handler functions.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use mesh_checkpoint::Checkpointer;

use crate::api::handlers;
use crate::api::middleware::{cors_layer, logging_layer};
use crate::config::ServerConfig;
use crate::history::HistoryStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub history: Arc<dyn HistoryStore>,
    pub config: Arc<ServerConfig>,
    pub checkpointer: Arc<dyn Checkpointer>,
}

/// Build the complete API router.
pub fn create_router(history: Arc<dyn HistoryStore>, config: Arc<ServerConfig>, checkpointer: Arc<dyn Checkpointer>) -> Router {
    let app_state = AppState { history, config, checkpointer };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/system/health", get(handlers::health_detailed))
        .route("/api/run", post(handlers::submit_run))
        .route("/api/run/:run_id/resume", post(handlers::resume_run))
        .route("/api/history", get(handlers::list_runs))
        .route("/api/history/stats", get(handlers::run_stats))
        .route("/api/history/:run_id", get(handlers::get_run))
        .layer(cors_layer())
        .layer(logging_layer())
        .with_state(app_state)
}

#[cfg(test)]
pub fn create_test_router(history: Arc<dyn HistoryStore>) -> Router {
    create_router(history, Arc::new(ServerConfig::from_env()), Arc::new(mesh_checkpoint::InMemoryCheckpointer::new()))
}
