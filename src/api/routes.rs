//! API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ApiState>`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::engine::scheduler::{RefreshScheduler, RefreshState};
use crate::types::{RefreshMarker, Snapshot};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub scheduler: Arc<RefreshScheduler>,
    pub service_name: String,
}

impl ApiState {
    pub fn new(scheduler: Arc<RefreshScheduler>, service_name: impl Into<String>) -> Self {
        Self {
            scheduler,
            service_name: service_name.into(),
        }
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
    pub cards_count: usize,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub state: RefreshState,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/supply and GET /api/data
pub async fn get_supply(State(state): State<AppState>) -> Response {
    match state.scheduler.current_or_build().await {
        Ok(snapshot) => Json(Snapshot::clone(&snapshot)).into_response(),
        Err(e) => {
            error!(error = %e, "Error serving supply data");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to fetch supply data" })),
            )
                .into_response()
        }
    }
}

/// GET /api/metadata
pub async fn get_metadata(State(state): State<AppState>) -> Json<RefreshMarker> {
    Json(state.scheduler.marker())
}

/// POST /api/refresh
pub async fn post_refresh(State(state): State<AppState>) -> Response {
    info!("Manual refresh requested");
    match state.scheduler.refresh().await {
        Ok(snapshot) => Json(RefreshResponse {
            success: true,
            message: "Data refreshed successfully".to_string(),
            cards_count: snapshot.len(),
            last_updated: snapshot.generated_at,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Error during manual refresh");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": "Failed to refresh data",
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        service: state.service_name.clone(),
    })
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        state: state.scheduler.state(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
