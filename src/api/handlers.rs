//! API Handlers
//!
//! HTTP request handlers for the administrative cache endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::cache::{CacheFacade, KeyBuilder};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    HealthResponse, InvalidateRequest, InvalidateResponse, ResetResponse, StatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub cache: Arc<CacheFacade>,
}

impl AppState {
    pub fn new(cache: CacheFacade) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Builds the facade from configuration, connecting the primary store.
    pub async fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(CacheFacade::from_config(config).await?))
    }
}

/// Handler for GET /health
///
/// 200 when the primary store answers a ping, 503 otherwise.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let report = state.cache.health_check().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(HealthResponse::from(report)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.statistics().await))
}

/// Handler for POST /stats/reset
pub async fn reset_stats_handler(State(state): State<AppState>) -> Json<ResetResponse> {
    state.cache.reset_statistics();
    info!("Cache statistics reset");
    Json(ResetResponse::new())
}

/// Handler for DELETE /cache/algorithms/:algorithm_id
pub async fn invalidate_algorithm_handler(
    State(state): State<AppState>,
    Path(algorithm_id): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    let removed = state.cache.invalidate_algorithm(&algorithm_id).await?;
    Ok(Json(InvalidateResponse::new(
        KeyBuilder::algorithm_pattern(&algorithm_id),
        removed,
    )))
}

/// Handler for DELETE /cache/symbols/:symbol
pub async fn invalidate_symbol_handler(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    let removed = state.cache.invalidate_symbol(&symbol).await?;
    let pattern = KeyBuilder::symbol_patterns(&symbol).join(" ");
    Ok(Json(InvalidateResponse::new(pattern, removed)))
}

/// Handler for POST /cache/invalidate
pub async fn invalidate_pattern_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidPattern(error_msg));
    }

    let removed = state.cache.invalidate(&req.pattern).await?;
    Ok(Json(InvalidateResponse::new(req.pattern.trim(), removed)))
}
