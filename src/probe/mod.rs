//! Reachability probes
//!
//! A probe is a single, bounded attempt against one `host:port` target. It
//! never fails: every transport problem is folded into a classified
//! [`ProbeResult`] with status `offline`.
//!
//! ## Strategies
//!
//! - **TCP** ([`tcp`]) - transport-level liveness, connect and close
//! - **HTTP(S)** ([`http`]) - `GET /`, status code plus elapsed time
//!
//! [`resolver::TargetResolver`] decides which strategy to use and adds the
//! optional extended metrics ([`dns`] timing, [`tls`] handshake and
//! certificate expiry).

pub mod dns;
pub mod http;
pub mod resolver;
pub mod tcp;
pub mod tls;

pub use resolver::{Strategy, TargetResolver};

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ports that are probed with HTTP(S) unless the host is a literal IP.
pub const WEB_PORTS: [u16; 3] = [80, 443, 8080];

/// Probe error types
///
/// These never escape the probe module as failures; they end up in
/// [`ProbeResult::error`].
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("dns resolution failed: {0}")]
    Dns(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("http request failed: {0}")]
    Http(String),
    #[error("tls inspection failed: {0}")]
    Tls(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Classification produced by a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Online,
    Degraded,
    Offline,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Online => "online",
            ProbeStatus::Degraded => "degraded",
            ProbeStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol hint carried by a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tcp" => Some(Protocol::Tcp),
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            _ => None,
        }
    }
}

/// A network endpoint to probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub protocol: Option<Protocol>,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: None,
        }
    }

    pub fn with_protocol(mut self, protocol: Option<Protocol>) -> Self {
        self.protocol = protocol;
        self
    }

    /// The host parsed as an IP address, accepting bracketed IPv6.
    pub fn ip(&self) -> Option<IpAddr> {
        self.host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .ok()
    }

    pub fn is_ip_literal(&self) -> bool {
        self.ip().is_some()
    }

    pub fn is_web_port(&self) -> bool {
        WEB_PORTS.contains(&self.port)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.ip() {
            Some(IpAddr::V6(ip)) => write!(f, "[{ip}]:{}", self.port),
            _ => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// Optional timing and certificate details gathered next to a probe.
///
/// All fields are best-effort; a failure to measure one simply leaves it empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_resolution_time: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_handshake_time: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_expiry_days: Option<i64>,
}

impl ExtendedMetrics {
    /// True when only the plain latency is known, i.e. there is nothing
    /// worth a separate metrics report.
    pub fn is_basic(&self) -> bool {
        self.dns_resolution_time.is_none()
            && self.tls_handshake_time.is_none()
            && self.certificate_expiry_days.is_none()
    }
}

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub host: String,
    pub port: u16,
    pub status: ProbeStatus,
    /// Milliseconds; `None` whenever the target was not reached
    pub response_time_ms: Option<u64>,
    pub metrics: ExtendedMetrics,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn reached(target: &Target, status: ProbeStatus, elapsed: Duration) -> Self {
        let response_time_ms = elapsed.as_millis() as u64;
        Self {
            host: target.host.clone(),
            port: target.port,
            status,
            response_time_ms: Some(response_time_ms),
            metrics: ExtendedMetrics {
                latency: Some(response_time_ms),
                ..Default::default()
            },
            error: None,
        }
    }

    pub fn offline(target: &Target, error: &ProbeError) -> Self {
        Self {
            host: target.host.clone(),
            port: target.port,
            status: ProbeStatus::Offline,
            response_time_ms: None,
            metrics: ExtendedMetrics::default(),
            error: Some(error.to_string()),
        }
    }
}
