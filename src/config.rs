use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::probe::{ProbeStatus, Protocol};
use crate::storage::schema::MonitorMode;

/// Probe classification thresholds
///
/// `response_timeout_ms` bounds every single probe attempt; anything slower is
/// treated as `offline`. Successful probes at or above `degraded_threshold_ms`
/// are classified `degraded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_response_timeout_ms", alias = "responseTimeoutMs")]
    pub response_timeout_ms: u64,

    #[serde(
        default = "default_degraded_threshold_ms",
        alias = "degradedThresholdMs"
    )]
    pub degraded_threshold_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
            degraded_threshold_ms: default_degraded_threshold_ms(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn degraded_threshold(&self) -> Duration {
        Duration::from_millis(self.degraded_threshold_ms)
    }

    /// Classify a successful attempt by its elapsed time.
    pub fn classify_elapsed(&self, elapsed: Duration) -> ProbeStatus {
        if elapsed >= self.timeout() {
            ProbeStatus::Offline
        } else if elapsed < self.degraded_threshold() {
            ProbeStatus::Online
        } else {
            ProbeStatus::Degraded
        }
    }
}

fn default_response_timeout_ms() -> u64 {
    3000
}

fn default_degraded_threshold_ms() -> u64 {
    1000
}

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Probe history older than this is deleted
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl StorageConfig {
    pub fn retention_days(&self) -> u32 {
        match self {
            StorageConfig::None => default_retention_days(),
            StorageConfig::Sqlite { retention_days, .. } => *retention_days,
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./pulsewatch.db")
}

fn default_retention_days() -> u32 {
    30
}

/// Hub (central server) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    #[serde(default = "crate::util::get_default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Bearer token required on operator routes
    pub auth_token: Option<String>,

    #[serde(default = "default_true")]
    pub enable_cors: bool,

    #[serde(default)]
    pub probe: ProbeConfig,

    /// Default check interval (seconds) for services that don't set one
    #[serde(default = "default_direct_check_interval")]
    pub direct_check_interval: u64,

    /// Agents are considered inactive after `check_interval * liveness_multiplier`
    /// seconds without a heartbeat
    #[serde(default = "default_liveness_multiplier")]
    pub liveness_multiplier: u32,

    /// Storage configuration (defaults to in-memory)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub agents: Vec<AgentSeed>,

    #[serde(default)]
    pub services: Vec<ServiceSeed>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: crate::util::get_default_bind_addr(),
            auth_token: None,
            enable_cors: true,
            probe: ProbeConfig::default(),
            direct_check_interval: default_direct_check_interval(),
            liveness_multiplier: default_liveness_multiplier(),
            storage: None,
            agents: vec![],
            services: vec![],
        }
    }
}

/// Agent registered from the hub config file on startup
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSeed {
    pub name: String,
    /// Fixed api key; generated when absent
    pub api_key: Option<String>,
    #[serde(default = "default_agent_check_interval")]
    pub check_interval: u64,
}

/// Service registered from the hub config file on startup
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSeed {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub protocol: Option<Protocol>,
    #[serde(default)]
    pub monitor: MonitorMode,
    /// Name of the agent probing this service (`monitor = agent` only)
    pub agent: Option<String>,
    pub interval: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_direct_check_interval() -> u64 {
    30
}

fn default_liveness_multiplier() -> u32 {
    3
}

pub fn default_agent_check_interval() -> u64 {
    5
}

/// Agent runtime configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the hub, e.g. `http://monitor.local:8080`
    #[serde(default)]
    pub hub_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    #[serde(default)]
    pub probe: ProbeConfig,

    /// Probe all assigned targets concurrently instead of one at a time
    #[serde(default)]
    pub parallel_checks: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            hub_url: String::new(),
            api_key: String::new(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            check_interval_ms: default_check_interval_ms(),
            probe: ProbeConfig::default(),
            parallel_checks: false,
        }
    }
}

impl AgentConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }

    /// Load from an optional file, then let `PULSE_HUB_URL` / `PULSE_API_KEY`
    /// override the file values.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => read_config_file::<AgentConfig>(path)?,
            None => AgentConfig::default(),
        };

        if let Some(url) = crate::util::get_hub_url() {
            config.hub_url = url;
        }
        if let Some(key) = crate::util::get_api_key() {
            config.api_key = key;
        }

        if config.hub_url.is_empty() {
            anyhow::bail!("no hub url configured (set hub_url or PULSE_HUB_URL)");
        }
        if config.api_key.is_empty() {
            anyhow::bail!("no api key configured (set api_key or PULSE_API_KEY)");
        }

        config.hub_url = config.hub_url.trim_end_matches('/').to_string();
        Ok(config)
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    1000
}

fn default_check_interval_ms() -> u64 {
    5000
}

pub fn read_config_file<T>(path: &str) -> anyhow::Result<T>
where
    T: DeserializeOwned + std::fmt::Debug,
{
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
