//! Agent endpoints
//!
//! The first three handlers are called by agents and authenticate with the
//! `apiKey` in the body. A rejected key leaves every table untouched.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::actors::messages::{ApplyOutcome, ProbeReport};
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{CreateAgentRequest, CreatedAgent},
};
use crate::protocol::{
    HeartbeatRequest, HeartbeatResponse, ReportAck, ServiceCheckReport, ServiceMetricsReport,
};
use crate::registrar::effective_status;
use crate::seed::generate_api_key;
use crate::storage::schema::{
    AgentRow, CheckSource, MetricSampleRow, MonitorMode, NewAgent, ServiceRow,
};

/// POST /api/agents/heartbeat
#[instrument(skip_all)]
pub async fn heartbeat(
    State(state): State<ApiState>,
    payload: Result<Json<HeartbeatRequest>, JsonRejection>,
) -> ApiResult<Json<HeartbeatResponse>> {
    let Json(request) = payload?;
    let response = state
        .registrar
        .receive_heartbeat(&request.api_key, request.server_info)
        .await?;
    Ok(Json(response))
}

/// Resolve the reporting agent and the service it reports on.
///
/// Agents may only report on services currently assigned to them; anything
/// else looks like an unknown service.
async fn assigned_service(
    state: &ApiState,
    api_key: &str,
    service_id: i64,
) -> ApiResult<(AgentRow, ServiceRow)> {
    let agent = state.registrar.authenticate(api_key).await?;

    let service = state
        .store
        .get_service(service_id)
        .await?
        .filter(|s| s.monitor_type == MonitorMode::Agent && s.agent_id == Some(agent.id))
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "service {service_id} is not assigned to agent {}",
                agent.id
            ))
        })?;

    Ok((agent, service))
}

/// POST /api/agents/service-check
#[instrument(skip_all)]
pub async fn service_check(
    State(state): State<ApiState>,
    payload: Result<Json<ServiceCheckReport>, JsonRejection>,
) -> ApiResult<Json<ReportAck>> {
    let Json(report) = payload?;
    let (agent, service) = assigned_service(&state, &report.api_key, report.service_id).await?;

    if report.host != service.host || report.port != service.port {
        debug!(
            "agent #{} reported {}:{} for service '{}' ({}:{})",
            agent.id, report.host, report.port, service.name, service.host, service.port
        );
    }

    let outcome = state
        .aggregator
        .apply(ProbeReport {
            service_id: service.id,
            status: report.status,
            response_time_ms: report.response_time,
            checked_at: Utc::now(),
            source: CheckSource::Agent,
        })
        .await?;

    match outcome {
        ApplyOutcome::Applied { .. } => Ok(Json(ReportAck { accepted: true })),
        ApplyOutcome::Stale => Ok(Json(ReportAck { accepted: false })),
        ApplyOutcome::UnknownService => Err(ApiError::NotFound(format!(
            "service {} not found",
            report.service_id
        ))),
    }
}

/// POST /api/agents/service-metrics
#[instrument(skip_all)]
pub async fn service_metrics(
    State(state): State<ApiState>,
    payload: Result<Json<ServiceMetricsReport>, JsonRejection>,
) -> ApiResult<Json<ReportAck>> {
    let Json(report) = payload?;
    let (_, service) = assigned_service(&state, &report.api_key, report.service_id).await?;

    state
        .store
        .insert_metric_sample(MetricSampleRow {
            service_id: service.id,
            timestamp: Utc::now(),
            metrics: report.metrics,
        })
        .await?;

    Ok(Json(ReportAck { accepted: true }))
}

/// POST /api/agents
pub async fn create_agent(
    State(state): State<ApiState>,
    payload: Result<Json<CreateAgentRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreatedAgent>)> {
    let Json(request) = payload?;

    if request.name.trim().is_empty() {
        return Err(ApiError::InvalidRequest("agent name must not be empty".to_string()));
    }
    if request.check_interval == 0 {
        return Err(ApiError::InvalidRequest("checkInterval must be positive".to_string()));
    }

    let api_key = match request.api_key {
        Some(key) if key.is_empty() => {
            return Err(ApiError::InvalidRequest("apiKey must not be empty".to_string()));
        }
        Some(key) => key,
        None => generate_api_key(),
    };

    let agent = state
        .store
        .create_agent(NewAgent {
            name: request.name,
            api_key: api_key.clone(),
            check_interval: request.check_interval,
        })
        .await?;

    info!("created agent '{}' (#{})", agent.name, agent.id);
    Ok((StatusCode::CREATED, Json(CreatedAgent { agent, api_key })))
}

/// GET /api/agents
///
/// Status is evaluated against the liveness window at request time.
pub async fn list_agents(State(state): State<ApiState>) -> ApiResult<Json<Vec<AgentRow>>> {
    let agents = state.registrar.list_agents_with_liveness(Utc::now()).await?;
    Ok(Json(agents))
}

/// GET /api/agents/:id
pub async fn get_agent(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AgentRow>> {
    let mut agent = state
        .store
        .get_agent(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("agent {id} not found")))?;

    agent.status = effective_status(&agent, state.registrar.liveness_multiplier(), Utc::now());
    Ok(Json(agent))
}

/// DELETE /api/agents/:id/key
pub async fn revoke_key(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if !state.store.revoke_api_key(id).await? {
        return Err(ApiError::NotFound(format!("agent {id} not found")));
    }

    info!("revoked api key of agent #{id}");
    Ok(StatusCode::NO_CONTENT)
}
