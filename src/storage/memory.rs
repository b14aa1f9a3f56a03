//! In-memory storage backend (no persistence)
//!
//! Useful for tests and for hubs started with `backend = none`. Probe history
//! is capped per service; the oldest entries are evicted first.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    AgentRow, AgentStatus, AlertRow, MetricSampleRow, MonitorMode, NewAgent, NewAlert, NewService,
    ServiceCheckRow, ServiceRow, ServiceStatus, StatusUpdate, UptimeStats,
};

/// Maximum history entries kept per service
const MAX_HISTORY_PER_SERVICE: usize = 1000;

#[derive(Default)]
struct Inner {
    agents: BTreeMap<i64, AgentRow>,
    services: BTreeMap<i64, ServiceRow>,
    alerts: BTreeMap<i64, AlertRow>,
    checks: HashMap<i64, VecDeque<ServiceCheckRow>>,
    samples: HashMap<i64, VecDeque<MetricSampleRow>>,
    next_agent_id: i64,
    next_service_id: i64,
    next_alert_id: i64,
}

impl Inner {
    fn push_alert(&mut self, alert: NewAlert) -> AlertRow {
        let id = next_id(&mut self.next_alert_id);
        let row = AlertRow {
            id,
            service_id: alert.service_id,
            alert_type: alert.alert_type,
            message: alert.message,
            timestamp: alert.timestamp,
            acknowledged: false,
        };
        self.alerts.insert(id, row.clone());
        row
    }
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

fn push_capped<T>(deque: &mut VecDeque<T>, item: T) {
    if deque.len() >= MAX_HISTORY_PER_SERVICE {
        deque.pop_front();
    }
    deque.push_back(item);
}

fn latest<T: Clone>(deque: Option<&VecDeque<T>>, limit: usize) -> Vec<T> {
    deque
        .map(|d| d.iter().skip(d.len().saturating_sub(limit)).cloned().collect())
        .unwrap_or_default()
}

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn create_agent(&self, agent: NewAgent) -> StorageResult<AgentRow> {
        let mut inner = self.inner.write().await;

        if inner.agents.values().any(|a| a.name == agent.name) {
            return Err(StorageError::Conflict(format!("agent {} exists", agent.name)));
        }
        if inner
            .agents
            .values()
            .any(|a| a.api_key.as_deref() == Some(agent.api_key.as_str()))
        {
            return Err(StorageError::Conflict("api key already in use".to_string()));
        }

        let id = next_id(&mut inner.next_agent_id);
        let row = AgentRow {
            id,
            name: agent.name,
            api_key: Some(agent.api_key),
            status: AgentStatus::Connecting,
            last_seen: None,
            server_info: None,
            check_interval: agent.check_interval,
            created_at: Utc::now(),
        };
        inner.agents.insert(id, row.clone());
        Ok(row)
    }

    async fn get_agent(&self, id: i64) -> StorageResult<Option<AgentRow>> {
        Ok(self.inner.read().await.agents.get(&id).cloned())
    }

    async fn find_agent_by_api_key(&self, api_key: &str) -> StorageResult<Option<AgentRow>> {
        let inner = self.inner.read().await;
        Ok(inner
            .agents
            .values()
            .find(|a| a.api_key.as_deref() == Some(api_key))
            .cloned())
    }

    async fn list_agents(&self) -> StorageResult<Vec<AgentRow>> {
        Ok(self.inner.read().await.agents.values().cloned().collect())
    }

    async fn record_heartbeat(
        &self,
        agent_id: i64,
        server_info: serde_json::Value,
        seen_at: DateTime<Utc>,
    ) -> StorageResult<Option<AgentRow>> {
        let mut inner = self.inner.write().await;
        Ok(inner.agents.get_mut(&agent_id).map(|agent| {
            agent.status = AgentStatus::Active;
            agent.last_seen = Some(seen_at);
            agent.server_info = Some(server_info);
            agent.clone()
        }))
    }

    async fn revoke_api_key(&self, agent_id: i64) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .agents
            .get_mut(&agent_id)
            .map(|agent| agent.api_key = None)
            .is_some())
    }

    async fn create_service(&self, service: NewService) -> StorageResult<ServiceRow> {
        let mut inner = self.inner.write().await;
        let id = next_id(&mut inner.next_service_id);
        let row = ServiceRow {
            id,
            name: service.name,
            host: service.host,
            port: service.port,
            protocol: service.protocol,
            monitor_type: service.monitor_type,
            agent_id: service.agent_id,
            check_interval: service.check_interval,
            status: ServiceStatus::Unknown,
            response_time_ms: None,
            last_checked: None,
        };
        inner.services.insert(id, row.clone());
        Ok(row)
    }

    async fn get_service(&self, id: i64) -> StorageResult<Option<ServiceRow>> {
        Ok(self.inner.read().await.services.get(&id).cloned())
    }

    async fn list_services(&self) -> StorageResult<Vec<ServiceRow>> {
        Ok(self.inner.read().await.services.values().cloned().collect())
    }

    async fn services_for_agent(&self, agent_id: i64) -> StorageResult<Vec<ServiceRow>> {
        let inner = self.inner.read().await;
        Ok(inner
            .services
            .values()
            .filter(|s| s.monitor_type == MonitorMode::Agent && s.agent_id == Some(agent_id))
            .cloned()
            .collect())
    }

    async fn update_monitor(
        &self,
        service_id: i64,
        monitor_type: MonitorMode,
        agent_id: Option<i64>,
    ) -> StorageResult<Option<ServiceRow>> {
        let mut inner = self.inner.write().await;
        Ok(inner.services.get_mut(&service_id).map(|service| {
            service.monitor_type = monitor_type;
            service.agent_id = agent_id;
            service.clone()
        }))
    }

    async fn write_status(&self, update: StatusUpdate) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(service) = inner.services.get_mut(&update.service_id) else {
            return Ok(false);
        };

        service.status = update.status;
        service.response_time_ms = update.response_time_ms;
        service.last_checked = update.last_checked;
        Ok(true)
    }

    async fn apply_transition(
        &self,
        update: StatusUpdate,
        alert: Option<NewAlert>,
    ) -> StorageResult<Option<AlertRow>> {
        let mut inner = self.inner.write().await;
        let Some(service) = inner.services.get_mut(&update.service_id) else {
            return Err(StorageError::QueryFailed(format!(
                "service #{} does not exist",
                update.service_id
            )));
        };

        service.status = update.status;
        service.response_time_ms = update.response_time_ms;
        service.last_checked = update.last_checked;

        Ok(alert.map(|alert| inner.push_alert(alert)))
    }

    async fn insert_alert(&self, alert: NewAlert) -> StorageResult<AlertRow> {
        Ok(self.inner.write().await.push_alert(alert))
    }

    async fn get_alert(&self, id: i64) -> StorageResult<Option<AlertRow>> {
        Ok(self.inner.read().await.alerts.get(&id).cloned())
    }

    async fn list_alerts(&self, unacknowledged_only: bool) -> StorageResult<Vec<AlertRow>> {
        let inner = self.inner.read().await;
        Ok(inner
            .alerts
            .values()
            .rev()
            .filter(|a| !unacknowledged_only || !a.acknowledged)
            .cloned()
            .collect())
    }

    async fn alerts_for_service(&self, service_id: i64) -> StorageResult<Vec<AlertRow>> {
        let inner = self.inner.read().await;
        Ok(inner
            .alerts
            .values()
            .rev()
            .filter(|a| a.service_id == service_id)
            .cloned()
            .collect())
    }

    async fn acknowledge_alert(&self, id: i64) -> StorageResult<Option<AlertRow>> {
        let mut inner = self.inner.write().await;
        Ok(inner.alerts.get_mut(&id).map(|alert| {
            alert.acknowledged = true;
            alert.clone()
        }))
    }

    async fn insert_service_check(&self, check: ServiceCheckRow) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        push_capped(inner.checks.entry(check.service_id).or_default(), check);
        Ok(())
    }

    async fn query_latest_service_checks(
        &self,
        service_id: i64,
        limit: usize,
    ) -> StorageResult<Vec<ServiceCheckRow>> {
        let inner = self.inner.read().await;
        Ok(latest(inner.checks.get(&service_id), limit))
    }

    async fn calculate_uptime(
        &self,
        service_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<UptimeStats> {
        let inner = self.inner.read().await;
        let checks: Vec<ServiceCheckRow> = inner
            .checks
            .get(&service_id)
            .map(|d| d.iter().filter(|c| c.timestamp >= since).cloned().collect())
            .unwrap_or_default();

        Ok(UptimeStats::from_checks(service_id, since, Utc::now(), &checks))
    }

    async fn insert_metric_sample(&self, sample: MetricSampleRow) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        push_capped(inner.samples.entry(sample.service_id).or_default(), sample);
        Ok(())
    }

    async fn query_latest_metric_samples(
        &self,
        service_id: i64,
        limit: usize,
    ) -> StorageResult<Vec<MetricSampleRow>> {
        let inner = self.inner.read().await;
        Ok(latest(inner.samples.get(&service_id), limit))
    }

    async fn cleanup_history(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut inner = self.inner.write().await;
        let mut deleted = 0;

        for checks in inner.checks.values_mut() {
            let len = checks.len();
            checks.retain(|c| c.timestamp >= before);
            deleted += len - checks.len();
        }
        for samples in inner.samples.values_mut() {
            let len = samples.len();
            samples.retain(|s| s.timestamp >= before);
            deleted += len - samples.len();
        }

        debug!("in-memory cleanup removed {deleted} history rows");
        Ok(deleted)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let inner = self.inner.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("services".to_string(), inner.services.len().to_string()),
                ("agents".to_string(), inner.agents.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
