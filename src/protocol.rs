//! Wire types exchanged between agents and the hub
//!
//! All bodies are JSON with camelCase field names. Agents authenticate with
//! the `apiKey` carried in every request body.

use serde::{Deserialize, Serialize};

use crate::probe::{ExtendedMetrics, ProbeStatus, Protocol, Target};
use crate::storage::schema::ServiceRow;

/// `POST /api/agents/heartbeat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub api_key: String,
    #[serde(default)]
    pub server_info: serde_json::Value,
}

/// A service the agent is expected to probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedService {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

impl AssignedService {
    pub fn target(&self) -> Target {
        Target::new(self.host.clone(), self.port).with_protocol(self.protocol)
    }
}

impl From<&ServiceRow> for AssignedService {
    fn from(row: &ServiceRow) -> Self {
        Self {
            id: row.id,
            name: row.name.clone(),
            host: row.host.clone(),
            port: row.port,
            protocol: row.protocol,
        }
    }
}

/// Reply to a heartbeat: the agent's complete current assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub agent_id: i64,
    pub services: Vec<AssignedService>,
}

/// `POST /api/agents/service-check`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheckReport {
    pub api_key: String,
    pub service_id: i64,
    pub host: String,
    pub port: u16,
    pub status: ProbeStatus,
    /// Milliseconds; absent when the service was not reached
    #[serde(default)]
    pub response_time: Option<u64>,
}

/// `POST /api/agents/service-metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetricsReport {
    pub api_key: String,
    pub service_id: i64,
    pub metrics: ExtendedMetrics,
}

/// Hub reply to a service-check report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAck {
    /// False when the report was older than the stored state and dropped
    pub accepted: bool,
}
