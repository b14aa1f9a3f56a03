//! Helper functions for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pulsewatch::{
    actors::{aggregator::AggregatorHandle, messages::ProbeReport},
    alerts::AlertGenerator,
    probe::ProbeStatus,
    storage::{
        MemoryBackend, StorageBackend,
        schema::{CheckSource, MonitorMode, NewAgent, NewService, ServiceRow, ServiceStatus},
    },
};
use chrono::{DateTime, Utc};

pub const TEST_TOKEN: &str = "test-token";

/// Store, alert generator and a running aggregator over the same backend
pub struct Pipeline {
    pub store: Arc<dyn StorageBackend>,
    pub alerts: AlertGenerator,
    pub aggregator: AggregatorHandle,
}

pub fn pipeline() -> Pipeline {
    pipeline_with(Arc::new(MemoryBackend::new()))
}

pub fn pipeline_with(store: Arc<dyn StorageBackend>) -> Pipeline {
    let alerts = AlertGenerator::new(store.clone());
    let aggregator = AggregatorHandle::spawn(store.clone(), alerts.clone());
    Pipeline {
        store,
        alerts,
        aggregator,
    }
}

pub fn direct_service(name: &str, host: &str, port: u16) -> NewService {
    NewService {
        name: name.to_string(),
        host: host.to_string(),
        port,
        protocol: None,
        monitor_type: MonitorMode::Direct,
        agent_id: None,
        check_interval: 30,
    }
}

pub fn agent_service(name: &str, agent_id: i64) -> NewService {
    NewService {
        monitor_type: MonitorMode::Agent,
        agent_id: Some(agent_id),
        ..direct_service(name, "10.0.0.2", 5432)
    }
}

pub fn new_agent(name: &str, api_key: &str) -> NewAgent {
    NewAgent {
        name: name.to_string(),
        api_key: api_key.to_string(),
        check_interval: 5,
    }
}

pub fn report(
    service: &ServiceRow,
    status: ProbeStatus,
    response_time_ms: Option<u64>,
    checked_at: DateTime<Utc>,
) -> ProbeReport {
    ProbeReport {
        service_id: service.id,
        status,
        response_time_ms,
        checked_at,
        source: CheckSource::Agent,
    }
}

/// Poll until the service reaches `status` or the timeout elapses.
pub async fn wait_for_status(
    store: &Arc<dyn StorageBackend>,
    service_id: i64,
    status: ServiceStatus,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if let Ok(Some(service)) = store.get_service(service_id).await
            && service.status == status
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

#[cfg(feature = "api")]
pub mod hub {
    use super::*;
    use pulsewatch::{
        api::{ApiConfig, ApiState, spawn_api_server},
        registrar::HeartbeatRegistrar,
    };
    use std::net::SocketAddr;

    pub struct TestHub {
        pub addr: SocketAddr,
        pub store: Arc<dyn StorageBackend>,
        pub aggregator: AggregatorHandle,
        pub http: reqwest::Client,
    }

    impl TestHub {
        pub fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }

        /// POST with the operator bearer token
        pub fn operator_post(&self, path: &str) -> reqwest::RequestBuilder {
            self.http.post(self.url(path)).bearer_auth(TEST_TOKEN)
        }

        pub fn operator_get(&self, path: &str) -> reqwest::RequestBuilder {
            self.http.get(self.url(path)).bearer_auth(TEST_TOKEN)
        }

        pub fn operator_put(&self, path: &str) -> reqwest::RequestBuilder {
            self.http.put(self.url(path)).bearer_auth(TEST_TOKEN)
        }

        /// Agent-facing POST, no bearer token
        pub fn agent_post(&self, path: &str) -> reqwest::RequestBuilder {
            self.http.post(self.url(path))
        }
    }

    /// Hub API on a random local port, operator routes behind `TEST_TOKEN`
    pub async fn spawn_hub() -> TestHub {
        let Pipeline {
            store,
            alerts,
            aggregator,
        } = pipeline();
        let registrar = HeartbeatRegistrar::new(store.clone(), 3);
        let state = ApiState::new(store.clone(), registrar, aggregator.clone(), alerts);

        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            auth_token: Some(TEST_TOKEN.to_string()),
            enable_cors: true,
        };

        let addr = spawn_api_server(config, state).await.unwrap();

        TestHub {
            addr,
            store,
            aggregator,
            http: reqwest::Client::new(),
        }
    }
}
