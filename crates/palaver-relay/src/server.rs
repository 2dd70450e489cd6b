// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the relay.

use std::sync::Arc;

use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use palaver_core::PalaverError;

use crate::auth::{AdminAuth, require_admin};
use crate::handlers;
use crate::relay::Relay;
use crate::ws;

/// Renders the Prometheus text exposition.
pub type MetricsRender = Arc<dyn Fn() -> String + Send + Sync>;

/// Health state for the unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus render function.
    pub prometheus_render: Option<MetricsRender>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            start_time: std::time::Instant::now(),
            prometheus_render: None,
        }
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct RelayState {
    pub relay: Relay,
    pub auth: AdminAuth,
    pub health: HealthState,
    /// Cancelled when the server shuts down; open sockets close with it.
    pub shutdown: CancellationToken,
}

impl RelayState {
    pub fn new(relay: Relay, auth: AdminAuth) -> Self {
        Self {
            relay,
            auth,
            health: HealthState::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_metrics(mut self, render: MetricsRender) -> Self {
        self.health.prometheus_render = Some(render);
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// Builds the relay router.
///
/// - public: `/health`, `/metrics`, `/poll`, `/typing`, `GET /status`,
///   `/session`, `/messages`
/// - admin (bearer token): `POST /status`, `/close-session`
/// - `/ws` (admin-ness decided during the upgrade, not by middleware)
pub fn router(state: RelayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .route("/poll", post(handlers::post_poll))
        .route("/typing", post(handlers::post_typing))
        .route("/status", get(handlers::get_status))
        .route(
            "/session",
            get(handlers::get_session).post(handlers::post_session),
        )
        .route("/messages", post(handlers::post_messages))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/status", post(handlers::post_status))
        .route("/close-session", post(handlers::post_close_session))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            require_admin,
        ))
        .with_state(state.clone());

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .merge(ws_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Binds the listening socket.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, PalaverError> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|e| PalaverError::transport(format!("failed to bind relay to {addr}"), e))
}

/// Serves until `state.shutdown` is cancelled, then stops the freshness
/// polls.
pub async fn serve(listener: TcpListener, state: RelayState) -> Result<(), PalaverError> {
    let shutdown = state.shutdown.clone();
    let relay = state.relay.clone();
    let app = router(state);

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("relay listening on {addr}");
    }

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| PalaverError::transport("relay server error", e));

    relay.shutdown();
    tracing::info!("relay stopped");
    served
}
