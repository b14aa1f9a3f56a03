//! Aggregator, alert generator and storage working together

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use pulsewatch::{
    actors::messages::ApplyOutcome,
    probe::ProbeStatus,
    storage::schema::{AlertType, ServiceStatus},
};

use crate::helpers::{direct_service, pipeline, report};

#[tokio::test]
async fn test_outage_and_recovery_scenario() {
    let p = pipeline();
    let service = p
        .store
        .create_service(direct_service("billing", "10.0.0.9", 8443))
        .await
        .unwrap();
    assert_eq!(service.status, ServiceStatus::Unknown);

    let t0 = Utc::now();

    // Probe 1: first observation, no alert
    let outcome = p
        .aggregator
        .apply(report(&service, ProbeStatus::Online, Some(45), t0))
        .await
        .unwrap();
    assert_matches!(outcome, ApplyOutcome::Applied { alert: None, .. });
    let current = p.store.get_service(service.id).await.unwrap().unwrap();
    assert_eq!(current.status, ServiceStatus::Online);
    assert_eq!(current.response_time_ms, Some(45));

    // Probe 2: timeout
    let outcome = p
        .aggregator
        .apply(report(&service, ProbeStatus::Offline, None, t0 + Duration::seconds(5)))
        .await
        .unwrap();
    let outage = match outcome {
        ApplyOutcome::Applied {
            alert: Some(alert), ..
        } => alert,
        other => panic!("expected an alert, got {other:?}"),
    };
    assert_eq!(outage.alert_type, AlertType::StatusChange);
    assert!(!outage.acknowledged);

    // Probe 3: still down, nothing new
    let outcome = p
        .aggregator
        .apply(report(&service, ProbeStatus::Offline, None, t0 + Duration::seconds(10)))
        .await
        .unwrap();
    assert_matches!(outcome, ApplyOutcome::Applied { alert: None, .. });
    let current = p.store.get_service(service.id).await.unwrap().unwrap();
    assert_eq!(current.status, ServiceStatus::Offline);
    assert_eq!(current.last_checked, Some(t0 + Duration::seconds(10)));

    // Probe 4: back
    let outcome = p
        .aggregator
        .apply(report(&service, ProbeStatus::Online, Some(80), t0 + Duration::seconds(15)))
        .await
        .unwrap();
    let recovery = match outcome {
        ApplyOutcome::Applied {
            alert: Some(alert), ..
        } => alert,
        other => panic!("expected an alert, got {other:?}"),
    };
    assert_eq!(recovery.alert_type, AlertType::Recovery);

    // Acknowledging the outage leaves the recovery alone
    let acked = p.alerts.acknowledge(outage.id).await.unwrap().unwrap();
    assert!(acked.acknowledged);

    let alerts = p.store.alerts_for_service(service.id).await.unwrap();
    assert_eq!(alerts.len(), 2);
    let recovery_now = alerts.iter().find(|a| a.id == recovery.id).unwrap();
    assert!(!recovery_now.acknowledged);

    let checks = p
        .store
        .query_latest_service_checks(service.id, 10)
        .await
        .unwrap();
    assert_eq!(checks.len(), 4);

    let uptime = p
        .store
        .calculate_uptime(service.id, t0 - Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(uptime.total_checks, 4);
    assert_eq!(uptime.reachable_checks, 2);
    assert_eq!(uptime.uptime_percentage, 50.0);
}

#[tokio::test]
async fn test_out_of_order_report_is_dropped() {
    let p = pipeline();
    let service = p
        .store
        .create_service(direct_service("api", "10.0.0.1", 80))
        .await
        .unwrap();
    let now = Utc::now();

    p.aggregator
        .apply(report(&service, ProbeStatus::Online, Some(20), now))
        .await
        .unwrap();

    let outcome = p
        .aggregator
        .apply(report(&service, ProbeStatus::Offline, None, now - Duration::seconds(3)))
        .await
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Stale);

    let current = p.store.get_service(service.id).await.unwrap().unwrap();
    assert_eq!(current.status, ServiceStatus::Online);
    assert!(p.store.list_alerts(false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_reports_alert_once_per_transition() {
    let p = pipeline();
    let service = p
        .store
        .create_service(direct_service("db", "10.0.0.5", 5432))
        .await
        .unwrap();
    let now = Utc::now();

    p.aggregator
        .apply(report(&service, ProbeStatus::Online, Some(10), now))
        .await
        .unwrap();

    // The same outage reported by many callers at once
    let later = now + Duration::seconds(1);
    let reports = (0..20).map(|_| {
        let aggregator = p.aggregator.clone();
        let r = report(&service, ProbeStatus::Offline, None, later);
        tokio::spawn(async move { aggregator.apply(r).await })
    });
    for handle in futures::future::join_all(reports).await {
        handle.unwrap().unwrap();
    }

    let alerts = p.store.alerts_for_service(service.id).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::StatusChange);
}

#[tokio::test]
async fn test_transition_events_are_broadcast() {
    let p = pipeline();
    let mut events = p.aggregator.subscribe();
    let service = p
        .store
        .create_service(direct_service("web", "10.0.0.3", 443))
        .await
        .unwrap();
    let now = Utc::now();

    p.aggregator
        .apply(report(&service, ProbeStatus::Degraded, Some(1500), now))
        .await
        .unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.service_id, service.id);
    assert_eq!(event.from, ServiceStatus::Unknown);
    assert_eq!(event.to, ServiceStatus::Degraded);
    assert!(event.alert.is_none());
}
