//! Axum router setup for the Grove server

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::{
    ServerState,
    handlers::{analyze_file, get_capsule, get_neighborhood, get_stats, health_check, search_symbols, start_enrichment},
    websocket::ws_handler,
};

pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Live enrichment events
        .route("/ws", get(ws_handler))
        // Queries
        .route("/api/health", get(health_check))
        .route("/api/stats", get(get_stats))
        .route("/api/capsule", get(get_capsule))
        .route("/api/search", get(search_symbols))
        .route("/api/neighborhood", get(get_neighborhood))
        // Enrichment triggers
        .route("/api/enrich", post(start_enrichment))
        .route("/api/analyze", post(analyze_file))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
