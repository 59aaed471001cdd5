//! API Routes
//!
//! Configures the Axum router with all admin endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cleanup_handler, clear_handler, health_handler, invalidate_change_handler,
    invalidate_key_handler, invalidate_pattern_handler, stats_handler, AppState,
};

/// Creates the admin router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check
/// - `GET /stats` - Cache statistics and stored keys
/// - `DELETE /keys/:key` - Invalidate one key
/// - `POST /invalidate/pattern` - Invalidate every key matching a glob
/// - `POST /invalidate/change` - Apply the rule table for a change type
/// - `POST /clear` - Drop every entry
/// - `POST /cleanup` - Sweep stale entries now
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/keys/:key", delete(invalidate_key_handler))
        .route("/invalidate/pattern", post(invalidate_pattern_handler))
        .route("/invalidate/change", post(invalidate_change_handler))
        .route("/clear", post(clear_handler))
        .route("/cleanup", post(cleanup_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
