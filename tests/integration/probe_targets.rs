//! Prober behaviour against real sockets and mock HTTP servers

use std::time::{Duration, Instant};

use pulsewatch::{
    config::ProbeConfig,
    probe::{ProbeStatus, Protocol, Target, TargetResolver},
};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn resolver(degraded_threshold_ms: u64, response_timeout_ms: u64) -> TargetResolver {
    TargetResolver::new(ProbeConfig {
        response_timeout_ms,
        degraded_threshold_ms,
    })
    .unwrap()
}

async fn http_target(template: ResponseTemplate) -> (MockServer, Target) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(template)
        .mount(&server)
        .await;

    let addr = server.address();
    let target = Target::new(addr.ip().to_string(), addr.port()).with_protocol(Some(Protocol::Http));
    (server, target)
}

#[tokio::test]
async fn test_http_200_is_online() {
    let (_server, target) = http_target(ResponseTemplate::new(200)).await;

    let result = resolver(1000, 3000).classify_and_probe(&target).await;

    assert_eq!(result.status, ProbeStatus::Online);
    assert!(result.response_time_ms.is_some());
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_http_redirect_counts_as_alive() {
    let (_server, target) = http_target(
        ResponseTemplate::new(301).insert_header("Location", "http://127.0.0.1:1/elsewhere"),
    )
    .await;

    let result = resolver(1000, 3000).classify_and_probe(&target).await;
    assert_eq!(result.status, ProbeStatus::Online);
}

#[tokio::test]
async fn test_http_error_codes_are_offline() {
    for code in [404, 500, 503] {
        let (_server, target) = http_target(ResponseTemplate::new(code)).await;

        let result = resolver(1000, 3000).classify_and_probe(&target).await;

        assert_eq!(result.status, ProbeStatus::Offline, "status code {code}");
        assert_eq!(result.response_time_ms, None);
    }
}

#[tokio::test]
async fn test_slow_success_is_degraded_not_online() {
    let (_server, target) =
        http_target(ResponseTemplate::new(200).set_delay(Duration::from_millis(300))).await;

    let result = resolver(100, 3000).classify_and_probe(&target).await;

    assert_eq!(result.status, ProbeStatus::Degraded);
    assert!(result.response_time_ms.unwrap_or_default() >= 100);
}

#[tokio::test]
async fn test_response_slower_than_timeout_is_offline() {
    let (_server, target) =
        http_target(ResponseTemplate::new(200).set_delay(Duration::from_millis(800))).await;

    let started = Instant::now();
    let result = resolver(100, 200).classify_and_probe(&target).await;

    assert_eq!(result.status, ProbeStatus::Offline);
    assert_eq!(result.response_time_ms, None);
    assert!(result.error.unwrap_or_default().contains("timed out"));
    // The listener accepts connections, but a timeout is not retried over TCP
    assert!(started.elapsed() < Duration::from_millis(600));
}

#[tokio::test]
async fn test_hostname_target_uses_resolved_addresses() {
    let (server, _) = http_target(ResponseTemplate::new(200)).await;
    let target = Target::new("localhost", server.address().port()).with_protocol(Some(Protocol::Http));

    let result = resolver(1000, 3000).classify_and_probe(&target).await;

    assert_eq!(result.status, ProbeStatus::Online);
    assert!(result.metrics.dns_resolution_time.is_some());
}

#[tokio::test]
async fn test_timeout_bounds_the_whole_check() {
    let (server, _) =
        http_target(ResponseTemplate::new(200).set_delay(Duration::from_millis(2000))).await;
    let target = Target::new("localhost", server.address().port()).with_protocol(Some(Protocol::Http));

    let started = Instant::now();
    let result = resolver(100, 300).classify_and_probe(&target).await;

    assert_eq!(result.status, ProbeStatus::Offline);
    assert!(started.elapsed() < Duration::from_millis(900));
}

#[tokio::test]
async fn test_tcp_connect_to_listener_is_online() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let result = resolver(1000, 3000)
        .classify_and_probe(&Target::new("127.0.0.1", port))
        .await;

    assert_eq!(result.status, ProbeStatus::Online);
    assert_eq!(result.host, "127.0.0.1");
    assert_eq!(result.port, port);
}

#[tokio::test]
async fn test_refused_connection_is_offline() {
    // Bind then drop to get a port nobody listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let result = resolver(1000, 3000)
        .classify_and_probe(&Target::new("127.0.0.1", port))
        .await;

    assert_eq!(result.status, ProbeStatus::Offline);
    assert_eq!(result.response_time_ms, None);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_literal_ip_falls_back_to_tcp_when_http_fails() {
    // Accepts connections and closes them without speaking HTTP
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });

    let target = Target::new("127.0.0.1", port).with_protocol(Some(Protocol::Http));
    let result = resolver(1000, 3000).classify_and_probe(&target).await;

    assert_eq!(result.status, ProbeStatus::Online);
}

#[tokio::test]
async fn test_unresolvable_name_fails_fast() {
    let target = Target::new("pulsewatch-does-not-exist.invalid", 443);

    let start = std::time::Instant::now();
    let result = resolver(1000, 3000).classify_and_probe(&target).await;

    assert_eq!(result.status, ProbeStatus::Offline);
    assert!(result.metrics.tls_handshake_time.is_none());
    assert!(start.elapsed() <= Duration::from_millis(3500));
}
