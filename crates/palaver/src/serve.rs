// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `palaver serve` command implementation.
//!
//! Builds the configured store, installs the Prometheus recorder, and runs
//! the relay until SIGINT or SIGTERM.

use palaver_config::PalaverConfig;
use palaver_core::PalaverError;
use palaver_relay::{AdminAuth, Relay, RelayOptions, RelayServer, RelayState};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::shutdown;

/// Runs the `palaver serve` command.
pub async fn run_serve(config: PalaverConfig) -> Result<(), PalaverError> {
    init_tracing(&config.server.log_level);
    info!("starting palaver serve");

    let cancel = shutdown::install_signal_handler();
    let server = start_relay(&config, cancel.clone()).await?;
    info!(addr = %server.local_addr(), "relay listening");

    server.wait().await?;
    info!("palaver serve shutdown complete");
    Ok(())
}

/// Builds the relay from `config` and starts it; it stops when `cancel` fires.
pub async fn start_relay(
    config: &PalaverConfig,
    cancel: CancellationToken,
) -> Result<RelayServer, PalaverError> {
    let store = palaver_store::build_store(config)?;
    let relay = Relay::new(store, RelayOptions::from_config(config));

    let auth = AdminAuth::new(config.server.admin_token.as_deref());
    if !auth.is_configured() {
        warn!("server.admin_token is not set; admin endpoints and admin sockets are disabled");
    }

    let state = with_metrics(RelayState::new(relay, auth)).with_shutdown(cancel);
    let listener = palaver_relay::bind(&config.server.host, config.server.port).await?;
    RelayServer::start(listener, state)
}

#[cfg(feature = "prometheus")]
fn with_metrics(state: RelayState) -> RelayState {
    match palaver_prometheus::PrometheusAdapter::new() {
        Ok(adapter) => state.with_metrics(std::sync::Arc::new(move || adapter.render())),
        Err(e) => {
            warn!(error = %e, "metrics disabled");
            state
        }
    }
}

#[cfg(not(feature = "prometheus"))]
fn with_metrics(state: RelayState) -> RelayState {
    state
}

/// Initializes the tracing subscriber; `RUST_LOG` wins over `log_level`.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("palaver={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::ServerFrame;
    use palaver_test_utils::WsTestClient;

    fn local_config() -> PalaverConfig {
        let mut config = PalaverConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.admin_token = Some("serve-test".to_string());
        config
    }

    #[tokio::test]
    async fn relay_starts_from_config_and_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let server = start_relay(&local_config(), cancel.clone()).await.unwrap();

        let url = format!("ws://{}/ws", server.local_addr());
        let mut peer = WsTestClient::connect(&url).await.unwrap();
        peer.send_raw("{\"type\":\"subscribe_status\"}").await.unwrap();
        let frame = peer.recv().await.unwrap();
        assert!(matches!(frame, ServerFrame::StatusChange { online: false }));

        cancel.cancel();
        server.wait().await.unwrap();
    }
}
