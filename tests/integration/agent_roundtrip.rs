//! A real agent runtime talking to a real hub

use std::time::Duration;

use pulsewatch::{
    agent::AgentRuntime,
    config::AgentConfig,
    storage::schema::{AlertType, ServiceStatus},
};
use tokio::net::TcpListener;

use crate::helpers::{agent_service, hub::spawn_hub, new_agent, wait_for_status};

#[tokio::test]
async fn test_agent_probes_its_assignment_and_reports() {
    let hub = spawn_hub().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let agent = hub.store.create_agent(new_agent("edge-1", "edge-key")).await.unwrap();
    let mut service = agent_service("local", agent.id);
    service.host = "127.0.0.1".to_string();
    service.port = port;
    let service = hub.store.create_service(service).await.unwrap();

    let handle = AgentRuntime::spawn(AgentConfig {
        hub_url: format!("http://{}", hub.addr),
        api_key: "edge-key".to_string(),
        heartbeat_interval_ms: 50,
        check_interval_ms: 100,
        ..Default::default()
    })
    .unwrap();

    assert!(
        wait_for_status(&hub.store, service.id, ServiceStatus::Online, Duration::from_secs(5)).await,
        "service never came online"
    );
    assert_eq!(handle.assignment().len(), 1);
    assert_eq!(handle.assignment()[0].id, service.id);

    // Take the target down
    drop(listener);

    assert!(
        wait_for_status(&hub.store, service.id, ServiceStatus::Offline, Duration::from_secs(5)).await,
        "service never went offline"
    );
    let alerts = hub.store.alerts_for_service(service.id).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::StatusChange);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_agent_with_wrong_key_changes_nothing() {
    let hub = spawn_hub().await;
    let agent = hub.store.create_agent(new_agent("edge-1", "edge-key")).await.unwrap();
    let service = hub
        .store
        .create_service(agent_service("db", agent.id))
        .await
        .unwrap();

    let handle = AgentRuntime::spawn(AgentConfig {
        hub_url: format!("http://{}", hub.addr),
        api_key: "stolen-key".to_string(),
        heartbeat_interval_ms: 50,
        check_interval_ms: 100,
        ..Default::default()
    })
    .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(handle.assignment().is_empty());
    handle.shutdown().await;

    let agent = hub.store.get_agent(agent.id).await.unwrap().unwrap();
    assert!(agent.last_seen.is_none());
    let service = hub.store.get_service(service.id).await.unwrap().unwrap();
    assert_eq!(service.status, ServiceStatus::Unknown);
}
