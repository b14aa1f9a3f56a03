//! AggregatorActor - the status state machine
//!
//! Every probe result, whether reported by an agent or produced by the direct
//! monitor, goes through this actor. A single task owns the read-modify-write
//! of service status, so two reports for the same service can never both see
//! the same "previous" status.
//!
//! ## Alert table
//!
//! ```text
//! unknown  → *         no alert (first observation)
//! online   → offline   status_change
//! degraded → offline   status_change
//! online   → degraded  degraded
//! offline  → degraded  degraded
//! offline  → online    recovery
//! degraded → online    recovery
//! *        → unknown   no alert
//! x        → x         no alert, fields still refreshed
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, instrument, trace, warn};

use crate::alerts::AlertGenerator;
use crate::registrar::effective_status;
use crate::storage::StorageBackend;
use crate::storage::error::StorageResult;
use crate::storage::schema::{
    AgentStatus, AlertType, MonitorMode, ServiceCheckRow, ServiceStatus, StatusUpdate,
};

use super::messages::{AggregatorCommand, ApplyOutcome, ProbeReport, TransitionEvent};

/// Alert type for a `from → to` transition, `None` if it isn't alert-worthy.
pub fn alert_type_for(from: ServiceStatus, to: ServiceStatus) -> Option<AlertType> {
    use ServiceStatus::*;

    match (from, to) {
        (Unknown, _) | (_, Unknown) => None,
        (a, b) if a == b => None,
        (Online | Degraded, Offline) => Some(AlertType::StatusChange),
        (Online | Offline, Degraded) => Some(AlertType::Degraded),
        (Offline | Degraded, Online) => Some(AlertType::Recovery),
        _ => None,
    }
}

pub struct AggregatorActor {
    store: Arc<dyn StorageBackend>,
    alerts: AlertGenerator,
    command_rx: mpsc::Receiver<AggregatorCommand>,
    event_tx: broadcast::Sender<TransitionEvent>,
}

impl AggregatorActor {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        alerts: AlertGenerator,
        command_rx: mpsc::Receiver<AggregatorCommand>,
        event_tx: broadcast::Sender<TransitionEvent>,
    ) -> Self {
        Self {
            store,
            alerts,
            command_rx,
            event_tx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting aggregator actor");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                AggregatorCommand::Apply { report, respond_to } => {
                    let result = self.apply(report).await;
                    if let Err(e) = &result {
                        warn!("failed to apply probe report: {e}");
                    }
                    let _ = respond_to.send(result);
                }

                AggregatorCommand::MarkUnknown {
                    service_id,
                    agent_id,
                    liveness_multiplier,
                    respond_to,
                } => {
                    let result = self
                        .mark_unknown(service_id, agent_id, liveness_multiplier)
                        .await;
                    let _ = respond_to.send(result);
                }

                AggregatorCommand::Shutdown => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        debug!("aggregator actor stopped");
    }

    async fn apply(&self, report: ProbeReport) -> StorageResult<ApplyOutcome> {
        let Some(service) = self.store.get_service(report.service_id).await? else {
            debug!("report for unknown service #{}", report.service_id);
            return Ok(ApplyOutcome::UnknownService);
        };

        if let Some(last_checked) = service.last_checked {
            if report.checked_at < last_checked {
                trace!(
                    "dropping stale report for service #{} ({} < {})",
                    service.id, report.checked_at, last_checked
                );
                return Ok(ApplyOutcome::Stale);
            }
        }

        let previous = service.status;
        let current = ServiceStatus::from(report.status);

        let new_alert = alert_type_for(previous, current)
            .map(|alert_type| self.alerts.for_transition(&service, previous, current, alert_type));

        let alert = self
            .store
            .apply_transition(
                StatusUpdate {
                    service_id: service.id,
                    status: current,
                    response_time_ms: report.response_time_ms,
                    last_checked: Some(report.checked_at),
                },
                new_alert,
            )
            .await?;

        if let Some(alert) = &alert {
            info!("alert #{} ({}): {}", alert.id, alert.alert_type, alert.message);
        }

        // History is best-effort; the status write above is what matters
        if let Err(e) = self
            .store
            .insert_service_check(ServiceCheckRow {
                service_id: service.id,
                timestamp: report.checked_at,
                status: current,
                response_time_ms: report.response_time_ms,
                source: report.source,
            })
            .await
        {
            warn!("failed to record check history for service #{}: {e}", service.id);
        }

        if previous != current {
            info!("service '{}' {} -> {}", service.name, previous, current);
            let _ = self.event_tx.send(TransitionEvent {
                service_id: service.id,
                service_name: service.name.clone(),
                from: previous,
                to: current,
                alert: alert.clone(),
                timestamp: report.checked_at,
            });
        }

        Ok(ApplyOutcome::Applied {
            previous,
            current,
            alert,
        })
    }

    async fn mark_unknown(
        &self,
        service_id: i64,
        agent_id: i64,
        liveness_multiplier: u32,
    ) -> StorageResult<bool> {
        let Some(service) = self.store.get_service(service_id).await? else {
            return Ok(false);
        };

        if service.status == ServiceStatus::Unknown
            || service.monitor_type != MonitorMode::Agent
            || service.agent_id != Some(agent_id)
        {
            return Ok(false);
        }

        // A heartbeat may have landed since the sweep looked
        let agent_inactive = self.store.get_agent(agent_id).await?.is_none_or(|agent| {
            effective_status(&agent, liveness_multiplier, Utc::now()) == AgentStatus::Inactive
        });
        if !agent_inactive {
            trace!("agent #{agent_id} is alive again, keeping service #{service_id}");
            return Ok(false);
        }

        self.store
            .write_status(StatusUpdate {
                service_id,
                status: ServiceStatus::Unknown,
                response_time_ms: None,
                last_checked: service.last_checked,
            })
            .await?;

        info!("service '{}' {} -> unknown (unmonitored)", service.name, service.status);
        let _ = self.event_tx.send(TransitionEvent {
            service_id,
            service_name: service.name,
            from: service.status,
            to: ServiceStatus::Unknown,
            alert: None,
            timestamp: Utc::now(),
        });

        Ok(true)
    }
}

/// Handle for controlling an AggregatorActor
#[derive(Clone)]
pub struct AggregatorHandle {
    sender: mpsc::Sender<AggregatorCommand>,
    event_tx: broadcast::Sender<TransitionEvent>,
}

impl AggregatorHandle {
    pub fn spawn(store: Arc<dyn StorageBackend>, alerts: AlertGenerator) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (event_tx, _) = broadcast::channel(256);

        let actor = AggregatorActor::new(store, alerts, cmd_rx, event_tx.clone());
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            event_tx,
        }
    }

    /// Apply a probe result and wait for the outcome.
    pub async fn apply(&self, report: ProbeReport) -> Result<ApplyOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AggregatorCommand::Apply {
                report,
                respond_to: tx,
            })
            .await
            .context("aggregator is not running")?;

        Ok(rx.await.context("aggregator dropped the request")??)
    }

    /// Mark `service_id` unknown if `agent_id` still owns it and is still
    /// inactive under `liveness_multiplier`.
    pub async fn mark_unknown(
        &self,
        service_id: i64,
        agent_id: i64,
        liveness_multiplier: u32,
    ) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AggregatorCommand::MarkUnknown {
                service_id,
                agent_id,
                liveness_multiplier,
                respond_to: tx,
            })
            .await
            .context("aggregator is not running")?;

        Ok(rx.await.context("aggregator dropped the request")??)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.event_tx.subscribe()
    }

    pub async fn shutdown(self) {
        let _ = self.sender.send(AggregatorCommand::Shutdown).await;
    }
}
