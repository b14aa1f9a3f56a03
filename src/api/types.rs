//! Request and response types for the operator API
//!
//! Agent-facing bodies live in [`crate::protocol`] since the agent's hub
//! client shares them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::schema::{
    AgentRow, Connection, ConnectionStatus, MetricSampleRow, MonitorMode, ServiceCheckRow,
};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage: StorageHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StorageHealth {
    pub healthy: bool,
    pub message: String,
}

/// POST /api/agents
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    pub name: String,
    /// Generated when absent
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "crate::config::default_agent_check_interval")]
    pub check_interval: u64,
}

/// The only response that ever carries an agent's api key
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAgent {
    #[serde(flatten)]
    pub agent: AgentRow,
    pub api_key: String,
}

/// PUT /api/services/:id/monitor
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMonitorRequest {
    pub monitor_type: MonitorMode,
    #[serde(default)]
    pub agent_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceChecksResponse {
    pub service_id: i64,
    pub checks: Vec<ServiceCheckRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetricsResponse {
    pub service_id: i64,
    pub samples: Vec<MetricSampleRow>,
}

/// Query parameters for history endpoints
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Query parameters for uptime statistics
#[derive(Debug, Default, Deserialize)]
pub struct UptimeQuery {
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertsQuery {
    #[serde(default)]
    pub unacknowledged: bool,
}

/// A connection with its colour resolved against current service state
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionView {
    #[serde(flatten)]
    pub connection: Connection,
    pub status: ConnectionStatus,
}
