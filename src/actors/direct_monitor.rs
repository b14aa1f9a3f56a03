//! DirectMonitorActor - hub-side probing of `direct` services
//!
//! Wakes up on a short sweep interval and, on every tick:
//!
//! 1. moves services owned by a silent agent to `unknown`
//! 2. probes every direct service whose own `check_interval` has elapsed
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → due services → TargetResolver → ProbeReport → AggregatorActor
//!     ↑
//!     └─── Commands (CheckNow, UpdateInterval, Shutdown)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, instrument, trace, warn};

use crate::probe::{ProbeResult, Target, TargetResolver};
use crate::registrar::HeartbeatRegistrar;
use crate::storage::StorageBackend;
use crate::storage::schema::{
    CheckSource, MetricSampleRow, MonitorMode, ServiceRow, ServiceStatus,
};

use super::aggregator::AggregatorHandle;
use super::messages::{MonitorCommand, ProbeReport};

/// Default sweep period
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct DirectMonitorActor {
    store: Arc<dyn StorageBackend>,
    resolver: TargetResolver,
    registrar: HeartbeatRegistrar,
    aggregator: AggregatorHandle,
    command_rx: mpsc::Receiver<MonitorCommand>,
    sweep_interval: Duration,
    /// When each service was last probed by this actor
    last_probe: HashMap<i64, Instant>,
}

impl DirectMonitorActor {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        resolver: TargetResolver,
        registrar: HeartbeatRegistrar,
        aggregator: AggregatorHandle,
        command_rx: mpsc::Receiver<MonitorCommand>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            registrar,
            aggregator,
            command_rx,
            sweep_interval,
            last_probe: HashMap::new(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting direct monitor actor");

        let mut ticker = self.ticker();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_unmonitored().await;
                    if let Err(e) = self.probe_services(false).await {
                        error!("direct probe round failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        MonitorCommand::CheckNow { respond_to } => {
                            debug!("received CheckNow command");
                            let result = self.probe_services(true).await;
                            let _ = respond_to.send(result);
                        }

                        MonitorCommand::UpdateInterval { interval_secs } => {
                            debug!("updating sweep interval to {interval_secs}s");
                            self.sweep_interval = Duration::from_secs(interval_secs.max(1));
                            ticker = self.ticker();
                        }

                        MonitorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("direct monitor actor stopped");
    }

    fn ticker(&self) -> tokio::time::Interval {
        let mut ticker = interval_at(Instant::now() + self.sweep_interval, self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    /// Agent-monitored services whose agent went silent are no longer
    /// observed by anyone; show them as `unknown` instead of a frozen status.
    async fn sweep_unmonitored(&self) {
        let inactive = match self.registrar.inactive_agent_ids(Utc::now()).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("could not evaluate agent liveness: {e}");
                return;
            }
        };

        for agent_id in inactive {
            let services = match self.store.services_for_agent(agent_id).await {
                Ok(services) => services,
                Err(e) => {
                    warn!("could not list services of agent #{agent_id}: {e}");
                    continue;
                }
            };

            for service in services.iter().filter(|s| s.status != ServiceStatus::Unknown) {
                debug!("agent #{agent_id} is inactive, service '{}' is unmonitored", service.name);
                let marked = self
                    .aggregator
                    .mark_unknown(service.id, agent_id, self.registrar.liveness_multiplier())
                    .await;
                if let Err(e) = marked {
                    warn!("failed to mark service #{} unknown: {:#}", service.id, e);
                }
            }
        }
    }

    fn is_due(&self, service: &ServiceRow, now: Instant) -> bool {
        let every = Duration::from_secs(service.check_interval.max(1));
        self.last_probe
            .get(&service.id)
            .is_none_or(|last| now.duration_since(*last) >= every)
    }

    /// Probe due direct services concurrently and feed the results to the
    /// aggregator. Returns how many services were probed.
    async fn probe_services(&mut self, force: bool) -> Result<usize> {
        let now = Instant::now();
        let due: Vec<ServiceRow> = self
            .store
            .list_services()
            .await?
            .into_iter()
            .filter(|s| s.monitor_type == MonitorMode::Direct)
            .filter(|s| force || self.is_due(s, now))
            .collect();

        if due.is_empty() {
            return Ok(0);
        }

        trace!("probing {} direct service(s)", due.len());
        for service in &due {
            self.last_probe.insert(service.id, now);
        }

        let results = join_all(due.iter().map(|service| {
            let target = Target::new(service.host.clone(), service.port)
                .with_protocol(service.protocol);
            let resolver = &self.resolver;
            async move { resolver.classify_and_probe(&target).await }
        }))
        .await;

        for (service, result) in due.iter().zip(results) {
            self.report(service, result).await;
        }

        Ok(due.len())
    }

    async fn report(&self, service: &ServiceRow, result: ProbeResult) {
        let checked_at = Utc::now();

        if let Some(error) = &result.error {
            debug!("service '{}' probe failed: {error}", service.name);
        }

        if !result.metrics.is_basic() {
            let sample = MetricSampleRow {
                service_id: service.id,
                timestamp: checked_at,
                metrics: result.metrics.clone(),
            };
            if let Err(e) = self.store.insert_metric_sample(sample).await {
                warn!("failed to store metrics for service #{}: {e}", service.id);
            }
        }

        let report = ProbeReport {
            service_id: service.id,
            status: result.status,
            response_time_ms: result.response_time_ms,
            checked_at,
            source: CheckSource::Direct,
        };
        if let Err(e) = self.aggregator.apply(report).await {
            error!("failed to apply result for service #{}: {:#}", service.id, e);
        }
    }
}

/// Handle for controlling a DirectMonitorActor
#[derive(Clone)]
pub struct DirectMonitorHandle {
    sender: mpsc::Sender<MonitorCommand>,
}

impl DirectMonitorHandle {
    pub fn spawn(
        store: Arc<dyn StorageBackend>,
        resolver: TargetResolver,
        registrar: HeartbeatRegistrar,
        aggregator: AggregatorHandle,
        sweep_interval: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = DirectMonitorActor::new(
            store,
            resolver,
            registrar,
            aggregator,
            cmd_rx,
            sweep_interval,
        );
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Probe every direct service immediately
    pub async fn check_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::CheckNow { respond_to: tx })
            .await?;

        rx.await?
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(MonitorCommand::UpdateInterval { interval_secs })
            .await?;
        Ok(())
    }

    pub async fn shutdown(self) {
        let _ = self.sender.send(MonitorCommand::Shutdown).await;
    }
}
