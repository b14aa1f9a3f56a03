//! Health check endpoint

use axum::{Json, extract::State};

use crate::api::{
    state::ApiState,
    types::{HealthResponse, StorageHealth},
};

/// GET /api/health
///
/// Always answers 200 so load balancers can tell the process is up; the
/// `storage` block says whether the backend is.
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let storage = match state.store.health_check().await {
        Ok(health) => StorageHealth {
            healthy: health.healthy,
            message: health.message,
        },
        Err(e) => StorageHealth {
            healthy: false,
            message: e.to_string(),
        },
    };

    Json(HealthResponse {
        status: if storage.healthy { "ok" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        storage,
    })
}
