//! Alert endpoints

use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
};
use tracing::info;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::AlertsQuery,
};
use crate::storage::schema::AlertRow;

/// GET /api/alerts?unacknowledged=true
///
/// Newest first.
pub async fn list_alerts(
    State(state): State<ApiState>,
    query: Result<Query<AlertsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<AlertRow>>> {
    let Query(query) = query?;
    Ok(Json(state.store.list_alerts(query.unacknowledged).await?))
}

/// PUT /api/alerts/:id/acknowledge
///
/// Acknowledging an already acknowledged alert succeeds and changes nothing.
pub async fn acknowledge_alert(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AlertRow>> {
    let alert = state
        .alerts
        .acknowledge(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("alert {id} not found")))?;

    info!("alert #{} acknowledged", alert.id);
    Ok(Json(alert))
}
