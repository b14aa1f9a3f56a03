//! SQLite persistence across restarts

use std::sync::Arc;

use chrono::{Duration, Utc};
use pulsewatch::{
    probe::ProbeStatus,
    storage::{
        StorageBackend,
        schema::{AgentStatus, AlertType, ServiceStatus},
        sqlite::SqliteBackend,
    },
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::tempdir;

use crate::helpers::{agent_service, direct_service, new_agent, pipeline_with, report};

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("hub.db");
    let t0 = Utc::now();

    let (agent_id, service_id) = {
        let store: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
        let p = pipeline_with(store.clone());

        let agent = store.create_agent(new_agent("edge-1", "k1")).await.unwrap();
        store
            .record_heartbeat(agent.id, serde_json::json!({ "hostname": "edge" }), t0)
            .await
            .unwrap();
        let service = store.create_service(agent_service("db", agent.id)).await.unwrap();

        p.aggregator
            .apply(report(&service, ProbeStatus::Online, Some(12), t0))
            .await
            .unwrap();
        p.aggregator
            .apply(report(&service, ProbeStatus::Offline, None, t0 + Duration::seconds(5)))
            .await
            .unwrap();

        p.aggregator.shutdown().await;
        store.close().await.unwrap();
        (agent.id, service.id)
    };

    let store = SqliteBackend::new(&db_path).await.unwrap();

    let agent = store.get_agent(agent_id).await.unwrap().unwrap();
    assert_eq!(agent.status, AgentStatus::Active);
    assert_eq!(agent.server_info.unwrap()["hostname"], "edge");
    assert!(store.find_agent_by_api_key("k1").await.unwrap().is_some());

    let service = store.get_service(service_id).await.unwrap().unwrap();
    assert_eq!(service.status, ServiceStatus::Offline);
    assert_eq!(service.response_time_ms, None);

    let alerts = store.list_alerts(true).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::StatusChange);

    let checks = store.query_latest_service_checks(service_id, 10).await.unwrap();
    assert_eq!(checks.len(), 2);
    assert_eq!(checks[0].status, ServiceStatus::Online);
}

#[tokio::test]
async fn test_retention_keeps_services_and_alerts() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn StorageBackend> =
        Arc::new(SqliteBackend::new(dir.path().join("hub.db")).await.unwrap());
    let p = pipeline_with(store.clone());

    let service = store
        .create_service(direct_service("site", "10.0.0.8", 80))
        .await
        .unwrap();
    let old = Utc::now() - Duration::days(40);

    p.aggregator
        .apply(report(&service, ProbeStatus::Online, Some(5), old))
        .await
        .unwrap();
    p.aggregator
        .apply(report(&service, ProbeStatus::Offline, None, old + Duration::seconds(1)))
        .await
        .unwrap();

    let deleted = store
        .cleanup_history(Utc::now() - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(deleted, 2);

    assert!(store.get_service(service.id).await.unwrap().is_some());
    assert_eq!(store.list_alerts(false).await.unwrap().len(), 1);
    assert!(
        store
            .query_latest_service_checks(service.id, 10)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_rejected_status_write_raises_no_alert() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("hub.db");
    let store: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let p = pipeline_with(store.clone());

    let service = store
        .create_service(direct_service("api", "10.0.0.9", 8080))
        .await
        .unwrap();
    let t0 = Utc::now();
    p.aggregator
        .apply(report(&service, ProbeStatus::Online, Some(8), t0))
        .await
        .unwrap();

    // Second connection to the same file, standing in for a failing disk
    let saboteur = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(SqliteConnectOptions::new().filename(&db_path))
        .await
        .unwrap();
    sqlx::query(
        "CREATE TRIGGER refuse_offline BEFORE UPDATE ON services \
         WHEN NEW.status = 'offline' BEGIN SELECT RAISE(ABORT, 'disk hiccup'); END",
    )
    .execute(&saboteur)
    .await
    .unwrap();

    let offline = report(&service, ProbeStatus::Offline, None, t0 + Duration::seconds(1));
    assert!(p.aggregator.apply(offline.clone()).await.is_err());
    assert!(store.list_alerts(false).await.unwrap().is_empty());

    sqlx::query("DROP TRIGGER refuse_offline")
        .execute(&saboteur)
        .await
        .unwrap();
    saboteur.close().await;

    p.aggregator.apply(offline.clone()).await.unwrap();
    p.aggregator
        .apply(report(&service, ProbeStatus::Offline, None, t0 + Duration::seconds(2)))
        .await
        .unwrap();

    let alerts = store.alerts_for_service(service.id).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::StatusChange);
    let stored = store.get_service(service.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ServiceStatus::Offline);
}
