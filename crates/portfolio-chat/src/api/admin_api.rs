//! Operational endpoints: liveness, index status and forced reloads
use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::context_engine::ChatStatus;
use crate::shared_state::UnifiedAppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub async fn health(State(state): State<UnifiedAppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

pub async fn status(State(state): State<UnifiedAppState>) -> Json<ChatStatus> {
    Json(state.orchestrator.status())
}

/// Reloads now instead of waiting for the interval. On failure the previous
/// snapshots keep serving and the error is reported.
pub async fn reload(
    State(state): State<UnifiedAppState>,
) -> Result<Json<ChatStatus>, (StatusCode, Json<ErrorResponse>)> {
    info!("Forced context reload requested");
    match state.orchestrator.reload_all().await {
        Ok(()) => Ok(Json(state.orchestrator.status())),
        Err(e) => {
            error!("Forced reload failed: {:#}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Reload failed: {}", e),
                }),
            ))
        }
    }
}
