//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers (API handlers) don't block the aggregator's writes
//! - **Migrations**: Schema versioning with `sqlx::migrate!`
//!
//! Timestamps are stored as unix milliseconds, enums as their lowercase
//! wire strings, `server_info` as a JSON string.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    AgentRow, AgentStatus, AlertRow, AlertType, CheckSource, MetricSampleRow, MonitorMode,
    NewAgent, NewAlert, NewService, ServiceCheckRow, ServiceRow, ServiceStatus, StatusUpdate,
    UptimeStats,
};
use crate::probe::{ExtendedMetrics, Protocol};

const SERVICE_COLUMNS: &str = "id, name, host, port, protocol, monitor_type, agent_id, \
     check_interval, status, response_time, last_checked";

const AGENT_COLUMNS: &str =
    "id, name, api_key, status, last_seen, server_info, check_interval, created_at";

const ALERT_COLUMNS: &str = "id, service_id, type, message, timestamp, acknowledged";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (creating if missing) the database at `db_path` and run migrations.
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> StorageResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StorageError::InvalidData(format!("timestamp out of range: {millis}")))
    }

    fn optional_timestamp(millis: Option<i64>) -> StorageResult<Option<DateTime<Utc>>> {
        millis.map(Self::millis_to_timestamp).transpose()
    }

    fn invalid(column: &str, value: &str) -> StorageError {
        StorageError::InvalidData(format!("unexpected {column} value '{value}'"))
    }

    fn row_to_service(row: &SqliteRow) -> StorageResult<ServiceRow> {
        let protocol: Option<String> = row.try_get("protocol")?;
        let monitor_type: String = row.try_get("monitor_type")?;
        let status: String = row.try_get("status")?;

        Ok(ServiceRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            host: row.try_get("host")?,
            port: row.try_get::<i64, _>("port")? as u16,
            protocol: protocol
                .map(|p| Protocol::parse(&p).ok_or_else(|| Self::invalid("protocol", &p)))
                .transpose()?,
            monitor_type: MonitorMode::parse(&monitor_type)
                .ok_or_else(|| Self::invalid("monitor_type", &monitor_type))?,
            agent_id: row.try_get("agent_id")?,
            check_interval: row.try_get::<i64, _>("check_interval")? as u64,
            status: ServiceStatus::parse(&status).ok_or_else(|| Self::invalid("status", &status))?,
            response_time_ms: row
                .try_get::<Option<i64>, _>("response_time")?
                .map(|v| v as u64),
            last_checked: Self::optional_timestamp(row.try_get("last_checked")?)?,
        })
    }

    fn row_to_agent(row: &SqliteRow) -> StorageResult<AgentRow> {
        let status: String = row.try_get("status")?;
        let server_info: Option<String> = row.try_get("server_info")?;

        Ok(AgentRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            api_key: row.try_get("api_key")?,
            status: AgentStatus::parse(&status).ok_or_else(|| Self::invalid("status", &status))?,
            last_seen: Self::optional_timestamp(row.try_get("last_seen")?)?,
            server_info: server_info
                .map(|info| serde_json::from_str(&info))
                .transpose()?,
            check_interval: row.try_get::<i64, _>("check_interval")? as u64,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?)?,
        })
    }

    fn row_to_alert(row: &SqliteRow) -> StorageResult<AlertRow> {
        let alert_type: String = row.try_get("type")?;

        Ok(AlertRow {
            id: row.try_get("id")?,
            service_id: row.try_get("service_id")?,
            alert_type: AlertType::parse(&alert_type)
                .ok_or_else(|| Self::invalid("type", &alert_type))?,
            message: row.try_get("message")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?)?,
            acknowledged: row.try_get("acknowledged")?,
        })
    }

    fn row_to_check(row: &SqliteRow) -> StorageResult<ServiceCheckRow> {
        let status: String = row.try_get("status")?;
        let source: String = row.try_get("source")?;

        Ok(ServiceCheckRow {
            service_id: row.try_get("service_id")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?)?,
            status: ServiceStatus::parse(&status).ok_or_else(|| Self::invalid("status", &status))?,
            response_time_ms: row
                .try_get::<Option<i64>, _>("response_time")?
                .map(|v| v as u64),
            source: CheckSource::parse(&source).ok_or_else(|| Self::invalid("source", &source))?,
        })
    }

    fn row_to_sample(row: &SqliteRow) -> StorageResult<MetricSampleRow> {
        let millis = |column: &str| -> StorageResult<Option<u64>> {
            Ok(row.try_get::<Option<i64>, _>(column)?.map(|v| v as u64))
        };

        Ok(MetricSampleRow {
            service_id: row.try_get("service_id")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?)?,
            metrics: ExtendedMetrics {
                latency: millis("latency")?,
                dns_resolution_time: millis("dns_resolution_time")?,
                tls_handshake_time: millis("tls_handshake_time")?,
                certificate_expiry_days: row.try_get("certificate_expiry_days")?,
            },
        })
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, agent), fields(name = %agent.name))]
    async fn create_agent(&self, agent: NewAgent) -> StorageResult<AgentRow> {
        let result = sqlx::query(
            "INSERT INTO agents (name, api_key, status, check_interval, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&agent.name)
        .bind(&agent.api_key)
        .bind(AgentStatus::Connecting.as_str())
        .bind(agent.check_interval as i64)
        .bind(Self::timestamp_to_millis(&Utc::now()))
        .execute(&self.pool)
        .await?;

        self.get_agent(result.last_insert_rowid())
            .await?
            .ok_or_else(|| StorageError::QueryFailed("inserted agent vanished".to_string()))
    }

    async fn get_agent(&self, id: i64) -> StorageResult<Option<AgentRow>> {
        let row = sqlx::query(&format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_agent).transpose()
    }

    async fn find_agent_by_api_key(&self, api_key: &str) -> StorageResult<Option<AgentRow>> {
        let row = sqlx::query(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE api_key IS NOT NULL AND api_key = ?"
        ))
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_agent).transpose()
    }

    async fn list_agents(&self) -> StorageResult<Vec<AgentRow>> {
        let rows = sqlx::query(&format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_agent).collect()
    }

    #[instrument(skip(self, server_info))]
    async fn record_heartbeat(
        &self,
        agent_id: i64,
        server_info: serde_json::Value,
        seen_at: DateTime<Utc>,
    ) -> StorageResult<Option<AgentRow>> {
        let result = sqlx::query(
            "UPDATE agents SET status = ?, last_seen = ?, server_info = ? WHERE id = ?",
        )
        .bind(AgentStatus::Active.as_str())
        .bind(Self::timestamp_to_millis(&seen_at))
        .bind(serde_json::to_string(&server_info)?)
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_agent(agent_id).await
    }

    #[instrument(skip(self))]
    async fn revoke_api_key(&self, agent_id: i64) -> StorageResult<bool> {
        let result = sqlx::query("UPDATE agents SET api_key = NULL WHERE id = ?")
            .bind(agent_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, service), fields(name = %service.name))]
    async fn create_service(&self, service: NewService) -> StorageResult<ServiceRow> {
        let result = sqlx::query(
            "INSERT INTO services (name, host, port, protocol, monitor_type, agent_id, check_interval, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&service.name)
        .bind(&service.host)
        .bind(service.port as i64)
        .bind(service.protocol.map(|p| p.as_str()))
        .bind(service.monitor_type.as_str())
        .bind(service.agent_id)
        .bind(service.check_interval as i64)
        .bind(ServiceStatus::Unknown.as_str())
        .execute(&self.pool)
        .await?;

        self.get_service(result.last_insert_rowid())
            .await?
            .ok_or_else(|| StorageError::QueryFailed("inserted service vanished".to_string()))
    }

    async fn get_service(&self, id: i64) -> StorageResult<Option<ServiceRow>> {
        let row = sqlx::query(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_service).transpose()
    }

    async fn list_services(&self) -> StorageResult<Vec<ServiceRow>> {
        let rows = sqlx::query(&format!("SELECT {SERVICE_COLUMNS} FROM services ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_service).collect()
    }

    async fn services_for_agent(&self, agent_id: i64) -> StorageResult<Vec<ServiceRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services \
             WHERE monitor_type = ? AND agent_id = ? ORDER BY id"
        ))
        .bind(MonitorMode::Agent.as_str())
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_service).collect()
    }

    #[instrument(skip(self))]
    async fn update_monitor(
        &self,
        service_id: i64,
        monitor_type: MonitorMode,
        agent_id: Option<i64>,
    ) -> StorageResult<Option<ServiceRow>> {
        let result = sqlx::query("UPDATE services SET monitor_type = ?, agent_id = ? WHERE id = ?")
            .bind(monitor_type.as_str())
            .bind(agent_id)
            .bind(service_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_service(service_id).await
    }

    #[instrument(skip(self, update), fields(service_id = update.service_id, status = %update.status))]
    async fn write_status(&self, update: StatusUpdate) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE services SET status = ?, response_time = ?, last_checked = ? WHERE id = ?",
        )
        .bind(update.status.as_str())
        .bind(update.response_time_ms.map(|v| v as i64))
        .bind(update.last_checked.as_ref().map(Self::timestamp_to_millis))
        .bind(update.service_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, update, alert), fields(service_id = update.service_id, status = %update.status))]
    async fn apply_transition(
        &self,
        update: StatusUpdate,
        alert: Option<NewAlert>,
    ) -> StorageResult<Option<AlertRow>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE services SET status = ?, response_time = ?, last_checked = ? WHERE id = ?",
        )
        .bind(update.status.as_str())
        .bind(update.response_time_ms.map(|v| v as i64))
        .bind(update.last_checked.as_ref().map(Self::timestamp_to_millis))
        .bind(update.service_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Err(StorageError::QueryFailed(format!(
                "service #{} does not exist",
                update.service_id
            )));
        }

        let alert_id = match alert {
            Some(alert) => Some(
                sqlx::query(
                    "INSERT INTO alerts (service_id, type, message, timestamp, acknowledged) \
                     VALUES (?, ?, ?, ?, 0)",
                )
                .bind(alert.service_id)
                .bind(alert.alert_type.as_str())
                .bind(&alert.message)
                .bind(Self::timestamp_to_millis(&alert.timestamp))
                .execute(&mut *tx)
                .await?
                .last_insert_rowid(),
            ),
            None => None,
        };

        tx.commit().await?;

        match alert_id {
            Some(id) => self
                .get_alert(id)
                .await?
                .map(Some)
                .ok_or_else(|| StorageError::QueryFailed("inserted alert vanished".to_string())),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, alert), fields(service_id = alert.service_id, alert_type = %alert.alert_type))]
    async fn insert_alert(&self, alert: NewAlert) -> StorageResult<AlertRow> {
        let result = sqlx::query(
            "INSERT INTO alerts (service_id, type, message, timestamp, acknowledged) \
             VALUES (?, ?, ?, ?, 0)",
        )
        .bind(alert.service_id)
        .bind(alert.alert_type.as_str())
        .bind(&alert.message)
        .bind(Self::timestamp_to_millis(&alert.timestamp))
        .execute(&self.pool)
        .await?;

        self.get_alert(result.last_insert_rowid())
            .await?
            .ok_or_else(|| StorageError::QueryFailed("inserted alert vanished".to_string()))
    }

    async fn get_alert(&self, id: i64) -> StorageResult<Option<AlertRow>> {
        let row = sqlx::query(&format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_alert).transpose()
    }

    async fn list_alerts(&self, unacknowledged_only: bool) -> StorageResult<Vec<AlertRow>> {
        let filter = if unacknowledged_only {
            "WHERE acknowledged = 0"
        } else {
            ""
        };
        let rows = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts {filter} ORDER BY timestamp DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_alert).collect()
    }

    async fn alerts_for_service(&self, service_id: i64) -> StorageResult<Vec<AlertRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE service_id = ? ORDER BY timestamp DESC, id DESC"
        ))
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_alert).collect()
    }

    #[instrument(skip(self))]
    async fn acknowledge_alert(&self, id: i64) -> StorageResult<Option<AlertRow>> {
        sqlx::query("UPDATE alerts SET acknowledged = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.get_alert(id).await
    }

    async fn insert_service_check(&self, check: ServiceCheckRow) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO service_checks (service_id, timestamp, status, response_time, source) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(check.service_id)
        .bind(Self::timestamp_to_millis(&check.timestamp))
        .bind(check.status.as_str())
        .bind(check.response_time_ms.map(|v| v as i64))
        .bind(check.source.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_latest_service_checks(
        &self,
        service_id: i64,
        limit: usize,
    ) -> StorageResult<Vec<ServiceCheckRow>> {
        let rows = sqlx::query(
            "SELECT service_id, timestamp, status, response_time, source FROM service_checks \
             WHERE service_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(service_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut checks = rows
            .iter()
            .map(Self::row_to_check)
            .collect::<StorageResult<Vec<_>>>()?;
        // Oldest first
        checks.reverse();
        Ok(checks)
    }

    #[instrument(skip(self))]
    async fn calculate_uptime(
        &self,
        service_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<UptimeStats> {
        let rows = sqlx::query(
            "SELECT service_id, timestamp, status, response_time, source FROM service_checks \
             WHERE service_id = ? AND timestamp >= ? ORDER BY timestamp ASC",
        )
        .bind(service_id)
        .bind(Self::timestamp_to_millis(&since))
        .fetch_all(&self.pool)
        .await?;

        let checks = rows
            .iter()
            .map(Self::row_to_check)
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(UptimeStats::from_checks(service_id, since, Utc::now(), &checks))
    }

    async fn insert_metric_sample(&self, sample: MetricSampleRow) -> StorageResult<()> {
        let metrics = &sample.metrics;
        sqlx::query(
            "INSERT INTO service_metrics (service_id, timestamp, latency, dns_resolution_time, \
             tls_handshake_time, certificate_expiry_days) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(sample.service_id)
        .bind(Self::timestamp_to_millis(&sample.timestamp))
        .bind(metrics.latency.map(|v| v as i64))
        .bind(metrics.dns_resolution_time.map(|v| v as i64))
        .bind(metrics.tls_handshake_time.map(|v| v as i64))
        .bind(metrics.certificate_expiry_days)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query_latest_metric_samples(
        &self,
        service_id: i64,
        limit: usize,
    ) -> StorageResult<Vec<MetricSampleRow>> {
        let rows = sqlx::query(
            "SELECT service_id, timestamp, latency, dns_resolution_time, tls_handshake_time, \
             certificate_expiry_days FROM service_metrics \
             WHERE service_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(service_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut samples = rows
            .iter()
            .map(Self::row_to_sample)
            .collect::<StorageResult<Vec<_>>>()?;
        samples.reverse();
        Ok(samples)
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_history(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let before_millis = Self::timestamp_to_millis(&before);

        let mut tx = self.pool.begin().await?;

        let checks = sqlx::query("DELETE FROM service_checks WHERE timestamp < ?")
            .bind(before_millis)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let samples = sqlx::query("DELETE FROM service_metrics WHERE timestamp < ?")
            .bind(before_millis)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        let deleted = (checks + samples) as usize;
        info!("deleted {} history rows older than {}", deleted, before);
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite backend operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
