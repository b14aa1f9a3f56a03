//! Row types for agents, services, alerts and probe history
//!
//! ## Ownership
//!
//! - `services.status` / `response_time` / `last_checked` are written only by
//!   the status aggregator
//! - `agents.status` / `last_seen` are written only by the heartbeat registrar
//! - `alerts` are inserted by the alert generator; the only later mutation is
//!   `acknowledged: false → true`
//!
//! Probe history (`service_checks`, `service_metrics`) is append-only and
//! pruned by the retention task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::probe::{ExtendedMetrics, ProbeStatus, Protocol};

/// Health of a service as stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Online,
    Degraded,
    Offline,
    /// No probe has completed yet, or the probing agent went silent
    #[default]
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Online => "online",
            ServiceStatus::Degraded => "degraded",
            ServiceStatus::Offline => "offline",
            ServiceStatus::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "online" => Some(ServiceStatus::Online),
            "degraded" => Some(ServiceStatus::Degraded),
            "offline" => Some(ServiceStatus::Offline),
            "unknown" => Some(ServiceStatus::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ProbeStatus> for ServiceStatus {
    fn from(value: ProbeStatus) -> Self {
        match value {
            ProbeStatus::Online => ServiceStatus::Online,
            ProbeStatus::Degraded => ServiceStatus::Degraded,
            ProbeStatus::Offline => ServiceStatus::Offline,
        }
    }
}

/// Who probes a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    /// Probed by the hub itself
    #[default]
    Direct,
    /// Probed by the agent named in `agent_id`
    Agent,
}

impl MonitorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorMode::Direct => "direct",
            MonitorMode::Agent => "agent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(MonitorMode::Direct),
            "agent" => Some(MonitorMode::Agent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Inactive,
    /// Registered but never heard from
    #[default]
    Connecting,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Inactive => "inactive",
            AgentStatus::Connecting => "connecting",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(AgentStatus::Active),
            "inactive" => Some(AgentStatus::Inactive),
            "connecting" => Some(AgentStatus::Connecting),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Service became unreachable
    StatusChange,
    Degraded,
    Recovery,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::StatusChange => "status_change",
            AlertType::Degraded => "degraded",
            AlertType::Recovery => "recovery",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "status_change" => Some(AlertType::StatusChange),
            "degraded" => Some(AlertType::Degraded),
            "recovery" => Some(AlertType::Recovery),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a probe result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckSource {
    Direct,
    Agent,
    /// Synthesized by the hub, e.g. when the probing agent went silent
    Hub,
}

impl CheckSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckSource::Direct => "direct",
            CheckSource::Agent => "agent",
            CheckSource::Hub => "hub",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(CheckSource::Direct),
            "agent" => Some(CheckSource::Agent),
            "hub" => Some(CheckSource::Hub),
            _ => None,
        }
    }
}

/// A monitored service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRow {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub protocol: Option<Protocol>,
    pub monitor_type: MonitorMode,
    pub agent_id: Option<i64>,
    /// Seconds between direct checks
    pub check_interval: u64,
    pub status: ServiceStatus,
    #[serde(rename = "responseTime")]
    pub response_time_ms: Option<u64>,
    pub last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewService {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: Option<Protocol>,
    #[serde(default)]
    pub monitor_type: MonitorMode,
    #[serde(default)]
    pub agent_id: Option<i64>,
    #[serde(default = "default_service_interval")]
    pub check_interval: u64,
}

fn default_service_interval() -> u64 {
    30
}

/// The single write path for a service's observed state
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub service_id: i64,
    pub status: ServiceStatus,
    pub response_time_ms: Option<u64>,
    pub last_checked: Option<DateTime<Utc>>,
}

/// A remote probing agent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRow {
    pub id: i64,
    pub name: String,
    /// `None` once revoked
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub status: AgentStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub server_info: Option<serde_json::Value>,
    /// Seconds; the agent's liveness window is derived from this
    pub check_interval: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAgent {
    pub name: String,
    pub api_key: String,
    pub check_interval: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRow {
    pub id: i64,
    pub service_id: i64,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub service_id: i64,
    pub alert_type: AlertType,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// One applied probe result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheckRow {
    pub service_id: i64,
    pub timestamp: DateTime<Utc>,
    pub status: ServiceStatus,
    #[serde(rename = "responseTime")]
    pub response_time_ms: Option<u64>,
    pub source: CheckSource,
}

/// One extended metrics report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSampleRow {
    pub service_id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub metrics: ExtendedMetrics,
}

/// Uptime statistics for a service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeStats {
    pub service_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_checks: u64,
    /// Checks that found the service `online` or `degraded`
    pub reachable_checks: u64,
    pub uptime_percentage: f64,
    pub avg_response_time_ms: Option<f64>,
}

impl UptimeStats {
    pub fn from_checks(
        service_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        checks: &[ServiceCheckRow],
    ) -> Self {
        let total_checks = checks.len() as u64;
        let reachable_checks = checks
            .iter()
            .filter(|c| matches!(c.status, ServiceStatus::Online | ServiceStatus::Degraded))
            .count() as u64;

        let times: Vec<u64> = checks.iter().filter_map(|c| c.response_time_ms).collect();
        let avg_response_time_ms = if times.is_empty() {
            None
        } else {
            Some(times.iter().sum::<u64>() as f64 / times.len() as f64)
        };

        let uptime_percentage = if total_checks == 0 {
            0.0
        } else {
            reachable_checks as f64 / total_checks as f64 * 100.0
        };

        Self {
            service_id,
            start,
            end,
            total_checks,
            reachable_checks,
            uptime_percentage,
            avg_response_time_ms,
        }
    }
}

/// Directed edge between two services, drawn by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source_id: i64,
    pub target_id: i64,
}

/// Colour of a connection, derived from both endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Online,
    Degraded,
    Offline,
    Unknown,
}

impl ConnectionStatus {
    /// Worst of both endpoints: offline > degraded > unknown > online.
    pub fn derive(source: ServiceStatus, target: ServiceStatus) -> Self {
        use ServiceStatus::*;
        match (source, target) {
            (Offline, _) | (_, Offline) => ConnectionStatus::Offline,
            (Degraded, _) | (_, Degraded) => ConnectionStatus::Degraded,
            (Unknown, _) | (_, Unknown) => ConnectionStatus::Unknown,
            (Online, Online) => ConnectionStatus::Online,
        }
    }
}
