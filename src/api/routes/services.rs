//! Service endpoints

use std::collections::HashMap;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use chrono::{Duration, Utc};
use tracing::info;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{
        ConnectionView, HistoryQuery, ServiceChecksResponse, ServiceMetricsResponse,
        UpdateMonitorRequest, UptimeQuery,
    },
};
use crate::storage::schema::{
    AlertRow, Connection, ConnectionStatus, MonitorMode, NewService, ServiceRow, ServiceStatus,
    UptimeStats,
};

/// Default lookback period for uptime (24 hours)
const DEFAULT_LOOKBACK_HOURS: i64 = 24;

const DEFAULT_HISTORY_LIMIT: usize = 100;
const MAX_HISTORY_LIMIT: usize = 1000;

/// Agent-monitored services need an existing owner; direct ones have none.
async fn validate_owner(
    state: &ApiState,
    monitor_type: MonitorMode,
    agent_id: Option<i64>,
) -> ApiResult<Option<i64>> {
    match (monitor_type, agent_id) {
        (MonitorMode::Direct, _) => Ok(None),
        (MonitorMode::Agent, None) => Err(ApiError::InvalidRequest(
            "agent-monitored services need an agentId".to_string(),
        )),
        (MonitorMode::Agent, Some(id)) => match state.store.get_agent(id).await? {
            Some(_) => Ok(Some(id)),
            None => Err(ApiError::InvalidRequest(format!("agent {id} does not exist"))),
        },
    }
}

async fn service_or_404(state: &ApiState, id: i64) -> ApiResult<ServiceRow> {
    state
        .store
        .get_service(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("service {id} not found")))
}

fn history_limit(query: &HistoryQuery) -> usize {
    query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

/// POST /api/services
pub async fn create_service(
    State(state): State<ApiState>,
    payload: Result<Json<NewService>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ServiceRow>)> {
    let Json(mut request) = payload?;

    if request.name.trim().is_empty() || request.host.trim().is_empty() {
        return Err(ApiError::InvalidRequest("name and host must not be empty".to_string()));
    }
    if request.port == 0 {
        return Err(ApiError::InvalidRequest("port must be between 1 and 65535".to_string()));
    }
    if request.check_interval == 0 {
        return Err(ApiError::InvalidRequest("checkInterval must be positive".to_string()));
    }

    request.agent_id = validate_owner(&state, request.monitor_type, request.agent_id).await?;

    let service = state.store.create_service(request).await?;
    info!(
        "created service '{}' (#{}, {})",
        service.name,
        service.id,
        service.monitor_type.as_str()
    );

    Ok((StatusCode::CREATED, Json(service)))
}

/// GET /api/services
pub async fn list_services(State(state): State<ApiState>) -> ApiResult<Json<Vec<ServiceRow>>> {
    Ok(Json(state.store.list_services().await?))
}

/// GET /api/services/:id
pub async fn get_service(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ServiceRow>> {
    Ok(Json(service_or_404(&state, id).await?))
}

/// PUT /api/services/:id/monitor
///
/// Takes effect for agents on their next heartbeat.
pub async fn update_monitor(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateMonitorRequest>, JsonRejection>,
) -> ApiResult<Json<ServiceRow>> {
    let Json(request) = payload?;
    let agent_id = validate_owner(&state, request.monitor_type, request.agent_id).await?;

    let service = state
        .store
        .update_monitor(id, request.monitor_type, agent_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("service {id} not found")))?;

    info!(
        "service '{}' now monitored by {}{}",
        service.name,
        service.monitor_type.as_str(),
        service
            .agent_id
            .map(|a| format!(" (agent #{a})"))
            .unwrap_or_default()
    );

    Ok(Json(service))
}

/// GET /api/services/:id/checks?limit=N
pub async fn get_service_checks(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<ServiceChecksResponse>> {
    let Query(query) = query?;
    service_or_404(&state, id).await?;

    let checks = state
        .store
        .query_latest_service_checks(id, history_limit(&query))
        .await?;

    Ok(Json(ServiceChecksResponse {
        service_id: id,
        checks,
    }))
}

/// GET /api/services/:id/metrics?limit=N
pub async fn get_service_metrics(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<ServiceMetricsResponse>> {
    let Query(query) = query?;
    service_or_404(&state, id).await?;

    let samples = state
        .store
        .query_latest_metric_samples(id, history_limit(&query))
        .await?;

    Ok(Json(ServiceMetricsResponse {
        service_id: id,
        samples,
    }))
}

/// GET /api/services/:id/uptime?since=RFC3339
pub async fn get_uptime(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    query: Result<Query<UptimeQuery>, QueryRejection>,
) -> ApiResult<Json<UptimeStats>> {
    let Query(query) = query?;
    service_or_404(&state, id).await?;

    let since = query
        .since
        .unwrap_or_else(|| Utc::now() - Duration::hours(DEFAULT_LOOKBACK_HOURS));

    Ok(Json(state.store.calculate_uptime(id, since).await?))
}

/// GET /api/services/:id/alerts
pub async fn get_service_alerts(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<AlertRow>>> {
    service_or_404(&state, id).await?;
    Ok(Json(state.store.alerts_for_service(id).await?))
}

/// POST /api/connections
///
/// Colours each edge from the current status of both endpoints. Edges naming
/// a service that doesn't exist count that endpoint as `unknown`.
pub async fn resolve_connections(
    State(state): State<ApiState>,
    payload: Result<Json<Vec<Connection>>, JsonRejection>,
) -> ApiResult<Json<Vec<ConnectionView>>> {
    let Json(connections) = payload?;

    let statuses: HashMap<i64, ServiceStatus> = state
        .store
        .list_services()
        .await?
        .into_iter()
        .map(|s| (s.id, s.status))
        .collect();
    let status_of = |id: i64| statuses.get(&id).copied().unwrap_or_default();

    let views = connections
        .into_iter()
        .map(|connection| ConnectionView {
            status: ConnectionStatus::derive(
                status_of(connection.source_id),
                status_of(connection.target_id),
            ),
            connection,
        })
        .collect();

    Ok(Json(views))
}
