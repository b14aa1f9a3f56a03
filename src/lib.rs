pub mod actors;
pub mod agent;
pub mod alerts;
pub mod api;
pub mod config;
pub mod probe;
pub mod protocol;
pub mod registrar;
pub mod seed;
pub mod storage;
pub mod util;

use serde::{Deserialize, Serialize};

/// Host metadata an agent reports with every heartbeat.
///
/// The hub treats this as an opaque payload and stores it verbatim on the
/// agent record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub hostname: Option<String>,
    pub platform: Option<String>,
    pub arch: String,
    pub cpus: usize,
    pub memory: MemoryInfo,
    /// Seconds since boot
    pub uptime: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total: u64,
    pub free: u64,
}
