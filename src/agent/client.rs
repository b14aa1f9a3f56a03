//! HTTP client for the agent-facing hub endpoints

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::ServerInfo;
use crate::probe::{ExtendedMetrics, ProbeResult};
use crate::protocol::{
    AssignedService, HeartbeatRequest, HeartbeatResponse, ReportAck, ServiceCheckReport,
    ServiceMetricsReport,
};

#[derive(Clone)]
pub struct HubClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HubClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build hub client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B, timeout: Duration) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        trace!("POST {url}");

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => bail!("hub rejected the api key"),
            status if !status.is_success() => bail!("hub answered {status} for {path}"),
            _ => {}
        }

        response
            .json()
            .await
            .with_context(|| format!("invalid response from {url}"))
    }

    /// Send one heartbeat; `timeout` should not exceed the heartbeat period.
    pub async fn heartbeat(&self, server_info: &ServerInfo, timeout: Duration) -> Result<HeartbeatResponse> {
        let request = HeartbeatRequest {
            api_key: self.api_key.clone(),
            server_info: serde_json::to_value(server_info)?,
        };
        self.post("/api/agents/heartbeat", &request, timeout).await
    }

    pub async fn report_check(
        &self,
        service: &AssignedService,
        result: &ProbeResult,
        timeout: Duration,
    ) -> Result<ReportAck> {
        let report = ServiceCheckReport {
            api_key: self.api_key.clone(),
            service_id: service.id,
            host: service.host.clone(),
            port: service.port,
            status: result.status,
            response_time: result.response_time_ms,
        };
        self.post("/api/agents/service-check", &report, timeout).await
    }

    pub async fn report_metrics(
        &self,
        service_id: i64,
        metrics: &ExtendedMetrics,
        timeout: Duration,
    ) -> Result<()> {
        let report = ServiceMetricsReport {
            api_key: self.api_key.clone(),
            service_id,
            metrics: metrics.clone(),
        };
        let _: serde_json::Value = self.post("/api/agents/service-metrics", &report, timeout).await?;
        Ok(())
    }
}
