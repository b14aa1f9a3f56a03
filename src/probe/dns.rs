//! Timed name resolution

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::lookup_host;
use tokio::time::timeout;
use tracing::trace;

use super::ProbeError;

/// Addresses a host resolved to, plus how long the lookup took
#[derive(Debug, Clone)]
pub struct Resolution {
    pub addrs: Vec<SocketAddr>,
    pub elapsed: Duration,
}

/// Resolve `host:port`, bounded by `limit`.
///
/// An empty answer counts as a failure: without an address there is nothing
/// to connect to.
pub async fn resolve(host: &str, port: u16, limit: Duration) -> Result<Resolution, ProbeError> {
    let start = Instant::now();

    let addrs: Vec<SocketAddr> = timeout(limit, lookup_host((host, port)))
        .await
        .map_err(|_| ProbeError::Timeout(limit))?
        .map_err(|e| ProbeError::Dns(format!("{host}: {e}")))?
        .collect();

    let elapsed = start.elapsed();

    if addrs.is_empty() {
        return Err(ProbeError::Dns(format!("{host}: no addresses")));
    }

    trace!("{host} resolved to {} address(es) in {elapsed:?}", addrs.len());

    Ok(Resolution { addrs, elapsed })
}
