//! API Handlers
//!
//! HTTP request handlers for the admin endpoints. Write-path services in
//! other processes use these to evict keys after a mutation.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::cache::CacheControl;
use crate::error::{CacheError, Result};
use crate::models::{
    HealthResponse, InvalidateChangeRequest, InvalidatePatternRequest, RemovedResponse,
    StatsResponse,
};

/// Application state shared across all handlers.
///
/// Holds the cache behind its type-erased control surface; the store
/// synchronizes internally so no extra lock is needed here.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn CacheControl>,
}

impl AppState {
    pub fn new(cache: Arc<dyn CacheControl>) -> Self {
        Self { cache }
    }
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.stats()))
}

/// Handler for DELETE /keys/:key
///
/// Missing keys are not an error; the response reports zero removals.
pub async fn invalidate_key_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<RemovedResponse> {
    let removed = usize::from(state.cache.invalidate(&key));
    Json(RemovedResponse::new(removed))
}

/// Handler for POST /invalidate/pattern
pub async fn invalidate_pattern_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidatePatternRequest>,
) -> Result<Json<RemovedResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let removed = state.cache.invalidate_pattern(&req.pattern);
    Ok(Json(RemovedResponse::new(removed)))
}

/// Handler for POST /invalidate/change
///
/// Unknown change types succeed with zero removals.
pub async fn invalidate_change_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateChangeRequest>,
) -> Result<Json<RemovedResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let removed = state
        .cache
        .invalidate_on_change(&req.change_type, req.entity_id.as_deref());
    Ok(Json(RemovedResponse::new(removed)))
}

/// Handler for POST /clear
pub async fn clear_handler(State(state): State<AppState>) -> Json<RemovedResponse> {
    let removed = state.cache.clear();
    info!("Cache cleared via admin API: {} entries removed", removed);
    Json(RemovedResponse::new(removed))
}

/// Handler for POST /cleanup
pub async fn cleanup_handler(State(state): State<AppState>) -> Json<RemovedResponse> {
    Json(RemovedResponse::new(state.cache.cleanup()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
