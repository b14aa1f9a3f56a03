use chrono::Utc;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

use crate::{MemoryInfo, ServerInfo};

/// Collects the host metadata sent with every heartbeat.
///
/// Keeps one `System` around so each heartbeat only refreshes memory.
pub struct SystemInfoCollector {
    sys: System,
}

impl SystemInfoCollector {
    pub fn new() -> Self {
        Self {
            sys: System::new_with_specifics(
                RefreshKind::nothing()
                    .with_memory(MemoryRefreshKind::everything())
                    .with_cpu(CpuRefreshKind::nothing()),
            ),
        }
    }

    pub fn collect(&mut self) -> ServerInfo {
        self.sys.refresh_memory();

        ServerInfo {
            hostname: System::host_name(),
            platform: Some(std::env::consts::OS.to_string()),
            arch: System::cpu_arch(),
            cpus: self.sys.cpus().len(),
            memory: MemoryInfo {
                total: self.sys.total_memory(),
                free: self.sys.available_memory(),
            },
            uptime: System::uptime(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for SystemInfoCollector {
    fn default() -> Self {
        Self::new()
    }
}
