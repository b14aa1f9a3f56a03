//! Storage backend trait definition

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{
    AgentRow, AlertRow, MetricSampleRow, MonitorMode, NewAgent, NewAlert, NewService,
    ServiceCheckRow, ServiceRow, StatusUpdate, UptimeStats,
};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for storage backends
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; they are shared between the
/// aggregator actor, the direct monitor and every API handler.
///
/// ## Concurrency
///
/// Backends don't coordinate read-modify-write cycles themselves. Callers that
/// decide something from a read (the aggregator deciding alert-worthiness)
/// must serialize per service.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // ========================================================================
    // Agents
    // ========================================================================

    /// Register a new agent in `connecting` state.
    async fn create_agent(&self, agent: NewAgent) -> StorageResult<AgentRow>;

    async fn get_agent(&self, id: i64) -> StorageResult<Option<AgentRow>>;

    /// Look up the agent owning `api_key`. Revoked keys never match.
    async fn find_agent_by_api_key(&self, api_key: &str) -> StorageResult<Option<AgentRow>>;

    async fn list_agents(&self) -> StorageResult<Vec<AgentRow>>;

    /// Mark the agent `active`, store `server_info` and bump `last_seen`.
    async fn record_heartbeat(
        &self,
        agent_id: i64,
        server_info: serde_json::Value,
        seen_at: DateTime<Utc>,
    ) -> StorageResult<Option<AgentRow>>;

    /// Invalidate the agent's api key. Returns false for unknown agents.
    async fn revoke_api_key(&self, agent_id: i64) -> StorageResult<bool>;

    // ========================================================================
    // Services
    // ========================================================================

    /// Register a new service in `unknown` state.
    async fn create_service(&self, service: NewService) -> StorageResult<ServiceRow>;

    async fn get_service(&self, id: i64) -> StorageResult<Option<ServiceRow>>;

    async fn list_services(&self) -> StorageResult<Vec<ServiceRow>>;

    /// Services with `monitor_type = agent` assigned to `agent_id`, ordered by id.
    async fn services_for_agent(&self, agent_id: i64) -> StorageResult<Vec<ServiceRow>>;

    /// Change who probes a service.
    async fn update_monitor(
        &self,
        service_id: i64,
        monitor_type: MonitorMode,
        agent_id: Option<i64>,
    ) -> StorageResult<Option<ServiceRow>>;

    /// Overwrite status, response time and last-checked of a service.
    ///
    /// Returns false when the service doesn't exist.
    async fn write_status(&self, update: StatusUpdate) -> StorageResult<bool>;

    /// Write a status update together with the alert it raises, if any.
    ///
    /// Both land or neither does. Fails when the service doesn't exist.
    async fn apply_transition(
        &self,
        update: StatusUpdate,
        alert: Option<NewAlert>,
    ) -> StorageResult<Option<AlertRow>>;

    // ========================================================================
    // Alerts
    // ========================================================================

    async fn insert_alert(&self, alert: NewAlert) -> StorageResult<AlertRow>;

    async fn get_alert(&self, id: i64) -> StorageResult<Option<AlertRow>>;

    /// All alerts, newest first; optionally only unacknowledged ones.
    async fn list_alerts(&self, unacknowledged_only: bool) -> StorageResult<Vec<AlertRow>>;

    /// Alerts of one service, newest first.
    async fn alerts_for_service(&self, service_id: i64) -> StorageResult<Vec<AlertRow>>;

    /// Set `acknowledged = true`. Acknowledging twice is not an error.
    async fn acknowledge_alert(&self, id: i64) -> StorageResult<Option<AlertRow>>;

    // ========================================================================
    // Probe history
    // ========================================================================

    async fn insert_service_check(&self, check: ServiceCheckRow) -> StorageResult<()>;

    /// The N most recent checks, oldest first.
    async fn query_latest_service_checks(
        &self,
        service_id: i64,
        limit: usize,
    ) -> StorageResult<Vec<ServiceCheckRow>>;

    /// Uptime over all checks recorded since `since`.
    async fn calculate_uptime(
        &self,
        service_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<UptimeStats>;

    async fn insert_metric_sample(&self, sample: MetricSampleRow) -> StorageResult<()>;

    /// The N most recent extended metric samples, oldest first.
    async fn query_latest_metric_samples(
        &self,
        service_id: i64,
        limit: usize,
    ) -> StorageResult<Vec<MetricSampleRow>>;

    /// Delete probe history older than `before`. Returns the number of rows
    /// removed. Services, agents and alerts are never pruned.
    async fn cleanup_history(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
