//! Raw TCP connect probe
//!
//! Opens a socket and closes it again. Nothing is read or written, so this
//! only says the transport layer is accepting connections.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use super::ProbeError;

/// Connect to the first reachable address, bounded by `limit` overall.
///
/// Returns the elapsed time until the connection was established.
pub async fn connect(addrs: &[SocketAddr], limit: Duration) -> Result<Duration, ProbeError> {
    if addrs.is_empty() {
        return Err(ProbeError::Connect("no addresses to connect to".to_string()));
    }

    let start = Instant::now();

    let stream = timeout(limit, TcpStream::connect(addrs))
        .await
        .map_err(|_| ProbeError::Timeout(limit))?
        .map_err(|e| ProbeError::Connect(e.to_string()))?;

    let elapsed = start.elapsed();
    trace!("tcp connect to {:?} took {elapsed:?}", stream.peer_addr().ok());
    drop(stream);

    Ok(elapsed)
}
