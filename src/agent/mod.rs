//! Agent Runtime
//!
//! Two independent loops share one piece of state, the current assignment:
//!
//! ```text
//! heartbeat loop (≈1s) ──send_replace──► watch<Arc<Vec<AssignedService>>>
//!                                                │ borrow (read-only)
//!                                                ▼
//!                                   check loop (≈5s) → probe → report
//! ```
//!
//! The heartbeat loop is the only writer and always replaces the whole list
//! with what the hub returned. A heartbeat still in flight when the next one
//! is due is not queued; its tick is skipped.

pub mod client;
pub mod system;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::AgentConfig;
use crate::probe::{ProbeResult, TargetResolver};
use crate::protocol::AssignedService;

pub use client::HubClient;
pub use system::SystemInfoCollector;

pub type Assignment = Arc<Vec<AssignedService>>;

/// A running agent; dropping it does not stop the loops, call `shutdown`.
pub struct AgentHandle {
    assignment: watch::Receiver<Assignment>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl AgentHandle {
    /// Snapshot of the services currently assigned to this agent
    pub fn assignment(&self) -> Assignment {
        self.assignment.borrow().clone()
    }

    /// Receiver notified whenever a heartbeat replaces the assignment
    pub fn subscribe(&self) -> watch::Receiver<Assignment> {
        self.assignment.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

pub struct AgentRuntime;

impl AgentRuntime {
    /// Start the heartbeat and check loops.
    pub fn spawn(config: AgentConfig) -> Result<AgentHandle> {
        let client = HubClient::new(config.hub_url.clone(), config.api_key.clone())?;
        let resolver = TargetResolver::new(config.probe)?;

        let (assignment_tx, assignment_rx) = watch::channel::<Assignment>(Arc::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            "agent starting: heartbeat every {:?}, checks every {:?}",
            config.heartbeat_interval(),
            config.check_interval()
        );

        let heartbeat = tokio::spawn(heartbeat_loop(
            client.clone(),
            config.heartbeat_interval(),
            assignment_tx,
            shutdown_rx.clone(),
        ));

        let checks = tokio::spawn(check_loop(
            resolver,
            client,
            config.check_interval(),
            config.parallel_checks,
            assignment_rx.clone(),
            shutdown_rx,
        ));

        Ok(AgentHandle {
            assignment: assignment_rx,
            shutdown_tx,
            tasks: vec![heartbeat, checks],
        })
    }
}

#[instrument(skip_all)]
async fn heartbeat_loop(
    client: HubClient,
    period: Duration,
    assignment_tx: watch::Sender<Assignment>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut collector = SystemInfoCollector::new();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let info = collector.collect();
                match client.heartbeat(&info, period).await {
                    Ok(response) => {
                        let changed = **assignment_tx.borrow() != response.services;
                        if changed {
                            debug!(
                                "assignment replaced: {} service(s) for agent #{}",
                                response.services.len(),
                                response.agent_id
                            );
                        }
                        assignment_tx.send_replace(Arc::new(response.services));
                    }
                    // The current assignment stays as it is until the hub answers again
                    Err(e) => warn!("heartbeat failed: {:#}", e),
                }
            }

            _ = shutdown.changed() => break,
        }
    }

    debug!("heartbeat loop stopped");
}

#[instrument(skip_all)]
async fn check_loop(
    resolver: TargetResolver,
    client: HubClient,
    period: Duration,
    parallel: bool,
    assignment: watch::Receiver<Assignment>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let services = assignment.borrow().clone();
                run_check_round(&resolver, &client, &services, parallel, period).await;
            }

            _ = shutdown.changed() => break,
        }
    }

    debug!("check loop stopped");
}

/// Probe every assigned service once and report each result.
///
/// A failing target or a failed report never stops the round. Returns the
/// probe results in assignment order.
pub async fn run_check_round(
    resolver: &TargetResolver,
    client: &HubClient,
    services: &[AssignedService],
    parallel: bool,
    report_timeout: Duration,
) -> Vec<ProbeResult> {
    trace!("check round over {} service(s)", services.len());

    if parallel {
        join_all(
            services
                .iter()
                .map(|service| check_one(resolver, client, service, report_timeout)),
        )
        .await
    } else {
        let mut results = Vec::with_capacity(services.len());
        for service in services {
            results.push(check_one(resolver, client, service, report_timeout).await);
        }
        results
    }
}

async fn check_one(
    resolver: &TargetResolver,
    client: &HubClient,
    service: &AssignedService,
    report_timeout: Duration,
) -> ProbeResult {
    let result = resolver.classify_and_probe(&service.target()).await;
    trace!("{} -> {}", service.name, result.status);

    if let Err(e) = client.report_check(service, &result, report_timeout).await {
        warn!("failed to report check for '{}': {:#}", service.name, e);
        return result;
    }

    if !result.metrics.is_basic() {
        if let Err(e) = client
            .report_metrics(service.id, &result.metrics, report_timeout)
            .await
        {
            warn!("failed to report metrics for '{}': {:#}", service.name, e);
        }
    }

    result
}
