//! HTTP(S) probe
//!
//! Issues `GET /` and classifies by status code and elapsed time. Redirects
//! are not followed: a 3xx answer already proves the server is alive.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::config::ProbeConfig;

use super::{ProbeError, ProbeStatus, Target};

/// Status code and timing of a completed request
#[derive(Debug, Clone, Copy)]
pub struct HttpResponse {
    pub status_code: u16,
    pub elapsed: Duration,
}

fn client_builder(config: &ProbeConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .connect_timeout(config.timeout())
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
}

/// Build the client shared by all HTTP probes.
///
/// Certificates are not verified; the probe measures reachability, not trust.
pub fn build_client(config: &ProbeConfig) -> Result<reqwest::Client, ProbeError> {
    client_builder(config)
        .build()
        .map_err(|e| ProbeError::Config(format!("failed to build HTTP client: {e}")))
}

/// Client that connects `host` to the already resolved `addrs` instead of
/// looking the name up again.
pub fn pinned_client(
    config: &ProbeConfig,
    host: &str,
    addrs: &[SocketAddr],
) -> Result<reqwest::Client, ProbeError> {
    client_builder(config)
        .resolve_to_addrs(host, addrs)
        .build()
        .map_err(|e| ProbeError::Config(format!("failed to build HTTP client: {e}")))
}

pub fn url_for(target: &Target, tls: bool) -> String {
    let scheme = if tls { "https" } else { "http" };
    format!("{scheme}://{target}/")
}

/// Perform a single `GET /`.
///
/// Any HTTP answer, including 4xx/5xx, is `Ok`; only network-level problems
/// are errors.
pub async fn request(
    client: &reqwest::Client,
    url: &str,
    limit: Duration,
) -> Result<HttpResponse, ProbeError> {
    let start = Instant::now();

    let response = client.get(url).timeout(limit).send().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(limit)
        } else {
            ProbeError::Http(e.to_string())
        }
    })?;

    let elapsed = start.elapsed();
    let status_code = response.status().as_u16();
    trace!("GET {url} -> {status_code} in {elapsed:?}");

    Ok(HttpResponse {
        status_code,
        elapsed,
    })
}

/// 200-399 are alive (and subject to the latency rule), everything else is down.
pub fn classify(response: &HttpResponse, config: &ProbeConfig) -> ProbeStatus {
    if (200..400).contains(&response.status_code) {
        config.classify_elapsed(response.elapsed)
    } else {
        ProbeStatus::Offline
    }
}
