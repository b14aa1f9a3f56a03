//! Strategy selection for a target
//!
//! ## Decision rule
//!
//! ```text
//! explicit protocol hint          → that strategy
//! literal IP or non-web port      → TCP
//! otherwise                       → HTTP (HTTPS on 443)
//!
//! HTTP network error + literal IP → one TCP retry before `offline`
//! HTTP timeout                    → `offline`, no retry
//! ```
//!
//! One deadline, the configured timeout, covers DNS, the strategy, any
//! fallback and certificate inspection together.
//!
//! Internal services on bare IPs often accept connections but mishandle a
//! plain `GET /`; the single TCP fallback keeps them from showing as offline.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace};

use crate::config::ProbeConfig;

use super::dns;
use super::http;
use super::tcp;
use super::tls::TlsInspector;
use super::{ProbeError, ProbeResult, ProbeStatus, Protocol, Target};

const HTTPS_PORT: u16 = 443;

/// How a target gets probed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Tcp,
    Http { tls: bool },
}

impl Strategy {
    pub fn for_target(target: &Target) -> Self {
        match target.protocol {
            Some(Protocol::Tcp) => Strategy::Tcp,
            Some(Protocol::Http) => Strategy::Http { tls: false },
            Some(Protocol::Https) => Strategy::Http { tls: true },
            None if target.is_ip_literal() || !target.is_web_port() => Strategy::Tcp,
            None => Strategy::Http {
                tls: target.port == HTTPS_PORT,
            },
        }
    }
}

/// Picks a strategy per target and runs it
///
/// Holds the HTTP client and TLS connector so they are reused across probes.
#[derive(Clone)]
pub struct TargetResolver {
    config: ProbeConfig,
    client: reqwest::Client,
    tls: TlsInspector,
}

impl TargetResolver {
    pub fn new(config: ProbeConfig) -> Result<Self, ProbeError> {
        Ok(Self {
            client: http::build_client(&config)?,
            tls: TlsInspector::new()?,
            config,
        })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Resolve, probe and gather extended metrics for one target.
    ///
    /// Never fails; every problem is folded into an `offline` result. The
    /// configured timeout bounds the whole call, not each step.
    #[instrument(skip(self), fields(target = %target))]
    pub async fn classify_and_probe(&self, target: &Target) -> ProbeResult {
        let deadline = Instant::now() + self.config.timeout();

        // A name that doesn't resolve can't be reached by any strategy
        let (addrs, dns_time) = match target.ip() {
            Some(ip) => (vec![SocketAddr::new(ip, target.port)], None),
            None => match dns::resolve(&target.host, target.port, self.config.timeout()).await {
                Ok(resolution) => (resolution.addrs, Some(resolution.elapsed)),
                Err(e) => {
                    debug!("fast-failing {target}: {e}");
                    return ProbeResult::offline(target, &e);
                }
            },
        };

        let strategy = Strategy::for_target(target);
        trace!("probing {target} with {strategy:?}");

        let mut result = match strategy {
            Strategy::Tcp => self.probe_tcp(target, &addrs, deadline).await,
            Strategy::Http { tls } => self.probe_http(target, &addrs, tls, deadline).await,
        };

        if let Some(dns_time) = dns_time {
            result.metrics.dns_resolution_time = Some(dns_time.as_millis() as u64);
        }

        if target.port == HTTPS_PORT && result.response_time_ms.is_some() {
            let inspected = match self.remaining(deadline) {
                Ok(left) => self.tls.inspect(&target.host, &addrs, left).await,
                Err(e) => Err(e),
            };
            match inspected {
                Ok(info) => {
                    result.metrics.tls_handshake_time = Some(info.handshake_time.as_millis() as u64);
                    result.metrics.certificate_expiry_days = Some(info.certificate_expiry_days);
                }
                Err(e) => debug!("certificate inspection for {target} skipped: {e}"),
            }
        }

        result
    }

    /// Time left until `deadline`; a timeout once it has passed.
    fn remaining(&self, deadline: Instant) -> Result<Duration, ProbeError> {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            Err(ProbeError::Timeout(self.config.timeout()))
        } else {
            Ok(left)
        }
    }

    /// Raw TCP strategy against already resolved addresses
    async fn probe_tcp(
        &self,
        target: &Target,
        addrs: &[SocketAddr],
        deadline: Instant,
    ) -> ProbeResult {
        let connected = match self.remaining(deadline) {
            Ok(left) => tcp::connect(addrs, left).await,
            Err(e) => Err(e),
        };

        match connected {
            Ok(elapsed) => {
                ProbeResult::reached(target, self.config.classify_elapsed(elapsed), elapsed)
            }
            Err(e) => {
                debug!("tcp probe of {target} failed: {e}");
                ProbeResult::offline(target, &e)
            }
        }
    }

    /// HTTP(S) strategy, with the TCP fallback for literal IPs
    async fn probe_http(
        &self,
        target: &Target,
        addrs: &[SocketAddr],
        tls: bool,
        deadline: Instant,
    ) -> ProbeResult {
        let url = http::url_for(target, tls);

        let answered = match self.remaining(deadline) {
            Ok(left) if target.is_ip_literal() => http::request(&self.client, &url, left).await,
            Ok(left) => match http::pinned_client(&self.config, &target.host, addrs) {
                Ok(client) => http::request(&client, &url, left).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match answered {
            Ok(response) => {
                let status = http::classify(&response, &self.config);
                let mut result = ProbeResult::reached(target, status, response.elapsed);
                if status == ProbeStatus::Offline {
                    result.response_time_ms = None;
                    result.error = Some(format!("unexpected status code {}", response.status_code));
                }
                result
            }
            // Timeouts are final; only refusals and protocol errors get the TCP retry
            Err(e) if target.is_ip_literal() && !matches!(e, ProbeError::Timeout(_)) => {
                debug!("http probe of {target} failed ({e}), falling back to tcp");
                self.probe_tcp(target, addrs, deadline).await
            }
            Err(e) => {
                debug!("http probe of {target} failed: {e}");
                ProbeResult::offline(target, &e)
            }
        }
    }
}
