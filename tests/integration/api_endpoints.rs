//! Integration tests for the hub's HTTP API
//!
//! Every test runs a real server on a random local port and talks to it
//! with reqwest, the same way agents and the dashboard do.

use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::helpers::hub::{TestHub, spawn_hub};

async fn create_agent(hub: &TestHub, name: &str) -> (i64, String) {
    let response = hub
        .operator_post("/api/agents")
        .json(&json!({ "name": name }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.unwrap();
    (
        body["id"].as_i64().unwrap(),
        body["apiKey"].as_str().unwrap().to_string(),
    )
}

async fn create_service(hub: &TestHub, body: Value) -> i64 {
    let response = hub
        .operator_post("/api/services")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.unwrap();
    body["id"].as_i64().unwrap()
}

async fn heartbeat(hub: &TestHub, api_key: &str) -> reqwest::Response {
    hub.agent_post("/api/agents/heartbeat")
        .json(&json!({
            "apiKey": api_key,
            "serverInfo": {
                "hostname": "edge",
                "platform": "linux",
                "arch": "x86_64",
                "cpus": 4,
                "memory": { "total": 1024, "free": 512 },
                "uptime": 60,
                "timestamp": "2026-01-01T00:00:00Z"
            }
        }))
        .send()
        .await
        .unwrap()
}

async fn check(hub: &TestHub, api_key: &str, service_id: i64, status: &str, rt: Option<u64>) -> Value {
    let response = hub
        .agent_post("/api/agents/service-check")
        .json(&json!({
            "apiKey": api_key,
            "serviceId": service_id,
            "host": "10.0.0.2",
            "port": 5432,
            "status": status,
            "responseTime": rt
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.unwrap()
}

async fn get_json(hub: &TestHub, path: &str) -> Value {
    let response = hub.operator_get(path).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK, "GET {path}");
    response.json().await.unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let hub = spawn_hub().await;

    let response = hub.http.get(hub.url("/api/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"]["healthy"], true);
}

#[tokio::test]
async fn test_operator_routes_require_token() {
    let hub = spawn_hub().await;

    let response = hub.http.get(hub.url("/api/services")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = hub
        .http
        .get(hub.url("/api/services"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = hub.operator_get("/api/services").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_heartbeat_returns_assignment_and_activates_agent() {
    let hub = spawn_hub().await;
    let (agent_id, key) = create_agent(&hub, "edge-1").await;
    let service_id = create_service(
        &hub,
        json!({ "name": "db", "host": "10.0.0.2", "port": 5432, "monitorType": "agent", "agentId": agent_id }),
    )
    .await;
    create_service(&hub, json!({ "name": "site", "host": "example.com", "port": 443 })).await;

    let agent = get_json(&hub, &format!("/api/agents/{agent_id}")).await;
    assert_eq!(agent["status"], "connecting");
    assert!(agent.get("apiKey").is_none());

    let response = heartbeat(&hub, &key).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["agentId"], agent_id);
    assert_eq!(body["services"].as_array().unwrap().len(), 1);
    assert_eq!(body["services"][0]["id"], service_id);
    assert_eq!(body["services"][0]["host"], "10.0.0.2");
    assert_eq!(body["services"][0]["port"], 5432);
    assert_eq!(body["services"][0]["name"], "db");

    let agent = get_json(&hub, &format!("/api/agents/{agent_id}")).await;
    assert_eq!(agent["status"], "active");
    assert_eq!(agent["serverInfo"]["hostname"], "edge");
}

#[tokio::test]
async fn test_unknown_key_is_rejected_without_side_effects() {
    let hub = spawn_hub().await;
    let (agent_id, _) = create_agent(&hub, "edge-1").await;
    let service_id = create_service(
        &hub,
        json!({ "name": "db", "host": "10.0.0.2", "port": 5432, "monitorType": "agent", "agentId": agent_id }),
    )
    .await;

    let response = heartbeat(&hub, "not-a-key").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = hub
        .agent_post("/api/agents/service-check")
        .json(&json!({
            "apiKey": "not-a-key",
            "serviceId": service_id,
            "host": "10.0.0.2",
            "port": 5432,
            "status": "offline",
            "responseTime": null
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let agent = get_json(&hub, &format!("/api/agents/{agent_id}")).await;
    assert_eq!(agent["status"], "connecting");
    assert!(agent["lastSeen"].is_null());

    let service = get_json(&hub, &format!("/api/services/{service_id}")).await;
    assert_eq!(service["status"], "unknown");
    assert!(service["lastChecked"].is_null());
    assert!(get_json(&hub, "/api/alerts").await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_revoked_key_stops_working() {
    let hub = spawn_hub().await;
    let (agent_id, key) = create_agent(&hub, "edge-1").await;
    assert_eq!(heartbeat(&hub, &key).await.status(), StatusCode::OK);

    let response = hub
        .http
        .delete(hub.url(&format!("/api/agents/{agent_id}/key")))
        .bearer_auth(crate::helpers::TEST_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(heartbeat(&hub, &key).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_report_is_bad_request() {
    let hub = spawn_hub().await;

    let response = hub
        .agent_post("/api/agents/service-check")
        .header("content-type", "application/json")
        .body(r#"{ "apiKey": "k", "serviceId": "seven" }"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_reassignment_shows_up_in_next_heartbeat() {
    let hub = spawn_hub().await;
    let (agent_a, key_a) = create_agent(&hub, "edge-a").await;
    let (agent_b, key_b) = create_agent(&hub, "edge-b").await;

    let mut ids = vec![];
    for (i, name) in ["db", "cache", "queue"].iter().enumerate() {
        ids.push(
            create_service(
                &hub,
                json!({ "name": name, "host": "10.0.0.2", "port": 6000 + i, "monitorType": "agent", "agentId": agent_a }),
            )
            .await,
        );
    }

    let response = hub
        .operator_put(&format!("/api/services/{}/monitor", ids[1]))
        .json(&json!({ "monitorType": "agent", "agentId": agent_b }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = hub
        .operator_put(&format!("/api/services/{}/monitor", ids[2]))
        .json(&json!({ "monitorType": "direct" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let assigned = |body: Value| -> Vec<i64> {
        body["services"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_i64().unwrap())
            .collect()
    };

    let a: Value = heartbeat(&hub, &key_a).await.json().await.unwrap();
    let b: Value = heartbeat(&hub, &key_b).await.json().await.unwrap();
    assert_eq!(assigned(a), vec![ids[0]]);
    assert_eq!(assigned(b), vec![ids[1]]);
}

#[tokio::test]
async fn test_agent_cannot_report_on_foreign_service() {
    let hub = spawn_hub().await;
    let (agent_a, _) = create_agent(&hub, "edge-a").await;
    let (_, key_b) = create_agent(&hub, "edge-b").await;
    let service_id = create_service(
        &hub,
        json!({ "name": "db", "host": "10.0.0.2", "port": 5432, "monitorType": "agent", "agentId": agent_a }),
    )
    .await;

    let response = hub
        .agent_post("/api/agents/service-check")
        .json(&json!({
            "apiKey": key_b,
            "serviceId": service_id,
            "host": "10.0.0.2",
            "port": 5432,
            "status": "offline",
            "responseTime": null
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let service = get_json(&hub, &format!("/api/services/{service_id}")).await;
    assert_eq!(service["status"], "unknown");
}

#[tokio::test]
async fn test_outage_scenario_over_http() {
    let hub = spawn_hub().await;
    let (agent_id, key) = create_agent(&hub, "edge-1").await;
    let service_id = create_service(
        &hub,
        json!({ "name": "db", "host": "10.0.0.2", "port": 5432, "monitorType": "agent", "agentId": agent_id }),
    )
    .await;
    let service_path = format!("/api/services/{service_id}");

    assert_eq!(check(&hub, &key, service_id, "online", Some(45)).await["accepted"], true);
    let service = get_json(&hub, &service_path).await;
    assert_eq!(service["status"], "online");
    assert_eq!(service["responseTime"], 45);
    assert!(get_json(&hub, "/api/alerts").await.as_array().unwrap().is_empty());

    check(&hub, &key, service_id, "offline", None).await;
    let service = get_json(&hub, &service_path).await;
    assert_eq!(service["status"], "offline");
    assert!(service["responseTime"].is_null());

    let alerts = get_json(&hub, "/api/alerts").await;
    assert_eq!(alerts.as_array().unwrap().len(), 1);
    assert_eq!(alerts[0]["type"], "status_change");
    assert_eq!(alerts[0]["acknowledged"], false);
    let outage_id = alerts[0]["id"].as_i64().unwrap();

    let checked_before = get_json(&hub, &service_path).await["lastChecked"].clone();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    check(&hub, &key, service_id, "offline", None).await;
    assert_eq!(get_json(&hub, "/api/alerts").await.as_array().unwrap().len(), 1);
    assert_ne!(get_json(&hub, &service_path).await["lastChecked"], checked_before);

    check(&hub, &key, service_id, "online", Some(80)).await;
    let alerts = get_json(&hub, "/api/alerts").await;
    assert_eq!(alerts.as_array().unwrap().len(), 2);
    assert_eq!(alerts[0]["type"], "recovery");

    for _ in 0..2 {
        let response = hub
            .operator_put(&format!("/api/alerts/{outage_id}/acknowledge"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["acknowledged"], true);
    }

    let open = get_json(&hub, "/api/alerts?unacknowledged=true").await;
    assert_eq!(open.as_array().unwrap().len(), 1);
    assert_eq!(open[0]["type"], "recovery");

    let checks = get_json(&hub, &format!("{service_path}/checks?limit=2")).await;
    let checks = checks["checks"].as_array().unwrap();
    assert_eq!(checks.len(), 2);
    assert_eq!(checks[1]["status"], "online");
    assert_eq!(checks[1]["source"], "agent");

    let uptime = get_json(&hub, &format!("{service_path}/uptime")).await;
    assert_eq!(uptime["totalChecks"], 4);
    assert_eq!(uptime["reachableChecks"], 2);
}

#[tokio::test]
async fn test_metrics_reports_are_stored() {
    let hub = spawn_hub().await;
    let (agent_id, key) = create_agent(&hub, "edge-1").await;
    let service_id = create_service(
        &hub,
        json!({ "name": "site", "host": "example.com", "port": 443, "monitorType": "agent", "agentId": agent_id }),
    )
    .await;

    let response = hub
        .agent_post("/api/agents/service-metrics")
        .json(&json!({
            "apiKey": key,
            "serviceId": service_id,
            "metrics": {
                "latency": 120,
                "dnsResolutionTime": 8,
                "tlsHandshakeTime": 40,
                "certificateExpiryDays": 57
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let metrics = get_json(&hub, &format!("/api/services/{service_id}/metrics")).await;
    let samples = metrics["samples"].as_array().unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0]["certificateExpiryDays"], 57);
    assert_eq!(samples[0]["tlsHandshakeTime"], 40);
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let hub = spawn_hub().await;

    for path in ["/api/services/999", "/api/services/999/checks", "/api/agents/999"] {
        let response = hub.operator_get(path).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "GET {path}");
    }

    let response = hub
        .operator_put("/api/alerts/999/acknowledge")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_service_owner_is_rejected() {
    let hub = spawn_hub().await;

    let response = hub
        .operator_post("/api/services")
        .json(&json!({ "name": "db", "host": "10.0.0.2", "port": 5432, "monitorType": "agent" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = hub
        .operator_post("/api/services")
        .json(&json!({ "name": "db", "host": "10.0.0.2", "port": 5432, "monitorType": "agent", "agentId": 42 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_agent_name_conflicts() {
    let hub = spawn_hub().await;
    create_agent(&hub, "edge-1").await;

    let response = hub
        .operator_post("/api/agents")
        .json(&json!({ "name": "edge-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_connections_take_worst_endpoint() {
    let hub = spawn_hub().await;
    let (agent_id, key) = create_agent(&hub, "edge-1").await;
    let up = create_service(
        &hub,
        json!({ "name": "api", "host": "10.0.0.2", "port": 80, "monitorType": "agent", "agentId": agent_id }),
    )
    .await;
    let down = create_service(
        &hub,
        json!({ "name": "db", "host": "10.0.0.2", "port": 5432, "monitorType": "agent", "agentId": agent_id }),
    )
    .await;
    check(&hub, &key, up, "online", Some(10)).await;
    check(&hub, &key, down, "offline", None).await;

    let response = hub
        .operator_post("/api/connections")
        .json(&json!([
            { "sourceId": up, "targetId": down },
            { "sourceId": up, "targetId": up },
            { "sourceId": up, "targetId": 999 }
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body[0]["status"], "offline");
    assert_eq!(body[1]["status"], "online");
    assert_eq!(body[2]["status"], "unknown");
    assert_eq!(body[0]["sourceId"], up);
}
