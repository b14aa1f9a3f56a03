//! Registers the agents and services listed in the hub config file.
//!
//! Seeding is idempotent by name: entries that already exist are left alone,
//! so restarting the hub against a persistent database doesn't duplicate them.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::config::HubConfig;
use crate::storage::StorageBackend;
use crate::storage::schema::{MonitorMode, NewAgent, NewService};

/// Generate a fresh agent api key
pub fn generate_api_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Outcome of seeding, mostly for logging
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub agents_created: usize,
    pub services_created: usize,
    /// Api keys generated for agents that didn't configure one, by agent name
    pub generated_keys: HashMap<String, String>,
}

pub async fn apply_seed(store: &dyn StorageBackend, config: &HubConfig) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    let mut agents: HashMap<String, i64> = store
        .list_agents()
        .await?
        .into_iter()
        .map(|a| (a.name, a.id))
        .collect();

    for seed in &config.agents {
        if agents.contains_key(&seed.name) {
            debug!("agent '{}' already registered", seed.name);
            continue;
        }

        let api_key = match &seed.api_key {
            Some(key) => key.clone(),
            None => {
                let key = generate_api_key();
                summary.generated_keys.insert(seed.name.clone(), key.clone());
                key
            }
        };

        let agent = store
            .create_agent(NewAgent {
                name: seed.name.clone(),
                api_key,
                check_interval: seed.check_interval,
            })
            .await
            .with_context(|| format!("failed to register agent '{}'", seed.name))?;

        info!("registered agent '{}' (#{})", agent.name, agent.id);
        agents.insert(agent.name, agent.id);
        summary.agents_created += 1;
    }

    let existing: Vec<String> = store
        .list_services()
        .await?
        .into_iter()
        .map(|s| s.name)
        .collect();

    for seed in &config.services {
        if existing.contains(&seed.name) {
            debug!("service '{}' already registered", seed.name);
            continue;
        }

        let agent_id = match (seed.monitor, &seed.agent) {
            (MonitorMode::Agent, Some(name)) => match agents.get(name) {
                Some(id) => Some(*id),
                None => bail!("service '{}' references unknown agent '{}'", seed.name, name),
            },
            (MonitorMode::Agent, None) => {
                bail!("service '{}' is agent-monitored but names no agent", seed.name)
            }
            (MonitorMode::Direct, _) => None,
        };

        let service = store
            .create_service(NewService {
                name: seed.name.clone(),
                host: seed.host.clone(),
                port: seed.port,
                protocol: seed.protocol,
                monitor_type: seed.monitor,
                agent_id,
                check_interval: seed.interval.unwrap_or(config.direct_check_interval),
            })
            .await
            .with_context(|| format!("failed to register service '{}'", seed.name))?;

        info!(
            "registered service '{}' ({}:{}, {})",
            service.name,
            service.host,
            service.port,
            service.monitor_type.as_str()
        );
        summary.services_created += 1;
    }

    Ok(summary)
}
