//! HTTP surface of the hub
//!
//! ## Endpoints
//!
//! Agent-facing, authenticated by the `apiKey` in the body:
//!
//! - `POST /api/agents/heartbeat` - Heartbeat, answers with the assignment
//! - `POST /api/agents/service-check` - Probe result for an assigned service
//! - `POST /api/agents/service-metrics` - Extended metrics for a probe
//!
//! Operator-facing, behind the optional bearer token:
//!
//! - `POST /api/agents`, `GET /api/agents`, `GET /api/agents/:id`
//! - `DELETE /api/agents/:id/key` - Revoke an agent's api key
//! - `POST /api/services`, `GET /api/services`, `GET /api/services/:id`
//! - `PUT /api/services/:id/monitor` - Switch between direct and agent checks
//! - `GET /api/services/:id/{checks,metrics,uptime,alerts}` - History
//! - `POST /api/connections` - Colour dashboard edges
//! - `GET /api/alerts`, `PUT /api/alerts/:id/acknowledge`
//!
//! `GET /api/health` is always public.

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use std::net::SocketAddr;
#[cfg(feature = "api")]
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Optional bearer token for operator routes
    pub auth_token: Option<String>,

    /// Enable CORS for dashboard
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: crate::util::get_default_bind_addr(),
            auth_token: None,
            enable_cors: true,
        }
    }
}

impl From<&crate::config::HubConfig> for ApiConfig {
    fn from(config: &crate::config::HubConfig) -> Self {
        Self {
            bind_addr: config.bind_addr,
            auth_token: config.auth_token.clone(),
            enable_cors: config.enable_cors,
        }
    }
}

/// Assemble the full router without binding it
#[cfg(feature = "api")]
pub fn build_router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let agent_routes = Router::new()
        .route("/api/agents/heartbeat", post(routes::agents::heartbeat))
        .route("/api/agents/service-check", post(routes::agents::service_check))
        .route(
            "/api/agents/service-metrics",
            post(routes::agents::service_metrics),
        )
        .route("/api/health", get(routes::health::health_check));

    let mut operator_routes = Router::new()
        .route(
            "/api/agents",
            post(routes::agents::create_agent).get(routes::agents::list_agents),
        )
        .route("/api/agents/:id", get(routes::agents::get_agent))
        .route("/api/agents/:id/key", delete(routes::agents::revoke_key))
        .route(
            "/api/services",
            post(routes::services::create_service).get(routes::services::list_services),
        )
        .route("/api/services/:id", get(routes::services::get_service))
        .route(
            "/api/services/:id/monitor",
            put(routes::services::update_monitor),
        )
        .route(
            "/api/services/:id/checks",
            get(routes::services::get_service_checks),
        )
        .route(
            "/api/services/:id/metrics",
            get(routes::services::get_service_metrics),
        )
        .route("/api/services/:id/uptime", get(routes::services::get_uptime))
        .route(
            "/api/services/:id/alerts",
            get(routes::services::get_service_alerts),
        )
        .route(
            "/api/connections",
            post(routes::services::resolve_connections),
        )
        .route("/api/alerts", get(routes::alerts::list_alerts))
        .route(
            "/api/alerts/:id/acknowledge",
            put(routes::alerts::acknowledge_alert),
        );

    // Only operator routes; agents authenticate with their api key
    if let Some(token) = config.auth_token.clone() {
        operator_routes = operator_routes.route_layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    let mut app = agent_routes
        .merge(operator_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = build_router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
