//! Heartbeat Registrar
//!
//! Validates agent api keys, records liveness and hands back the agent's
//! current assignment. Liveness is never swept in the background: readers
//! derive `inactive` from `last_seen` and the agent's liveness window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::protocol::{AssignedService, HeartbeatResponse};
use crate::storage::StorageBackend;
use crate::storage::error::StorageError;
use crate::storage::schema::{AgentRow, AgentStatus};

/// Shortest liveness window regardless of configuration
pub const MIN_LIVENESS_WINDOW: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum RegistrarError {
    #[error("unknown or revoked api key")]
    UnknownApiKey,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Time an agent may stay silent before it counts as `inactive`.
pub fn liveness_window(agent: &AgentRow, multiplier: u32) -> Duration {
    Duration::from_secs(agent.check_interval.saturating_mul(multiplier as u64))
        .max(MIN_LIVENESS_WINDOW)
}

/// Status of `agent` as seen at `now`.
///
/// An `active` agent whose last heartbeat is older than its liveness window is
/// reported `inactive`. `connecting` agents stay `connecting` until their
/// first heartbeat.
pub fn effective_status(agent: &AgentRow, multiplier: u32, now: DateTime<Utc>) -> AgentStatus {
    match (agent.status, agent.last_seen) {
        (AgentStatus::Connecting, None) => AgentStatus::Connecting,
        (_, None) => AgentStatus::Inactive,
        (_, Some(last_seen)) => {
            let silent_for = (now - last_seen).to_std().unwrap_or(Duration::ZERO);
            if silent_for > liveness_window(agent, multiplier) {
                AgentStatus::Inactive
            } else {
                AgentStatus::Active
            }
        }
    }
}

#[derive(Clone)]
pub struct HeartbeatRegistrar {
    store: Arc<dyn StorageBackend>,
    liveness_multiplier: u32,
}

impl HeartbeatRegistrar {
    pub fn new(store: Arc<dyn StorageBackend>, liveness_multiplier: u32) -> Self {
        Self {
            store,
            liveness_multiplier,
        }
    }

    pub fn liveness_multiplier(&self) -> u32 {
        self.liveness_multiplier
    }

    /// Resolve an api key to its agent without touching any state.
    pub async fn authenticate(&self, api_key: &str) -> Result<AgentRow, RegistrarError> {
        if api_key.is_empty() {
            return Err(RegistrarError::UnknownApiKey);
        }

        self.store
            .find_agent_by_api_key(api_key)
            .await?
            .ok_or(RegistrarError::UnknownApiKey)
    }

    /// Record a heartbeat and return the agent's complete assignment.
    #[instrument(skip_all)]
    pub async fn receive_heartbeat(
        &self,
        api_key: &str,
        server_info: serde_json::Value,
    ) -> Result<HeartbeatResponse, RegistrarError> {
        let agent = match self.authenticate(api_key).await {
            Ok(agent) => agent,
            Err(e) => {
                warn!("rejecting heartbeat: {e}");
                return Err(e);
            }
        };

        let agent = self
            .store
            .record_heartbeat(agent.id, server_info, Utc::now())
            .await?
            .ok_or(RegistrarError::UnknownApiKey)?;

        let services: Vec<AssignedService> = self
            .store
            .services_for_agent(agent.id)
            .await?
            .iter()
            .map(AssignedService::from)
            .collect();

        debug!(
            "heartbeat from agent #{} ({}), {} service(s) assigned",
            agent.id,
            agent.name,
            services.len()
        );

        Ok(HeartbeatResponse {
            agent_id: agent.id,
            services,
        })
    }

    /// All agents with their status evaluated at `now`.
    pub async fn list_agents_with_liveness(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AgentRow>, RegistrarError> {
        let mut agents = self.store.list_agents().await?;
        for agent in &mut agents {
            agent.status = effective_status(agent, self.liveness_multiplier, now);
        }
        Ok(agents)
    }

    /// Ids of agents that have been heard from before but are silent now.
    pub async fn inactive_agent_ids(&self, now: DateTime<Utc>) -> Result<Vec<i64>, RegistrarError> {
        Ok(self
            .list_agents_with_liveness(now)
            .await?
            .into_iter()
            .filter(|a| a.status == AgentStatus::Inactive)
            .map(|a| a.id)
            .collect())
    }
}
