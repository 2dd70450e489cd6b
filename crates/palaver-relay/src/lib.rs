// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket relay and HTTP polling surface.
//!
//! Visitors and operators connect over `/ws`, join a session, and exchange
//! messages and typing indicators that the relay persists through a
//! [`ChatStore`](palaver_core::ChatStore) and fans out to every peer of the
//! session. Clients without a socket use the HTTP polling endpoints, which
//! share the same store and reach the same socket peers.

pub mod auth;
pub mod freshness;
pub mod handlers;
pub mod registry;
pub mod relay;
pub mod server;
pub mod ws;

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use palaver_core::{AdapterType, HealthStatus, PalaverError, PluginAdapter};

pub use auth::AdminAuth;
pub use freshness::FreshnessPolls;
pub use registry::{ConnectionPeer, PeerId, SessionRegistry};
pub use relay::{Relay, RelayOptions};
pub use server::{HealthState, MetricsRender, RelayState, bind, router, serve};

/// A relay server running as a background task.
pub struct RelayServer {
    state: RelayState,
    local_addr: SocketAddr,
    handle: Mutex<Option<JoinHandle<Result<(), PalaverError>>>>,
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("local_addr", &self.local_addr)
            .field("relay", &self.state.relay)
            .finish()
    }
}

impl RelayServer {
    /// Starts serving on `listener`.
    pub fn start(listener: TcpListener, state: RelayState) -> Result<Self, PalaverError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| PalaverError::transport("relay listener has no local address", e))?;
        let handle = tokio::spawn(serve(listener, state.clone()));
        Ok(Self {
            state,
            local_addr,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn relay(&self) -> &Relay {
        &self.state.relay
    }

    /// Token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Waits for the server task to end.
    pub async fn wait(&self) -> Result<(), PalaverError> {
        let Some(handle) = self.handle.lock().await.take() else {
            return Ok(());
        };
        handle
            .await
            .map_err(|e| PalaverError::Internal(format!("relay task failed: {e}")))?
    }
}

#[async_trait]
impl PluginAdapter for RelayServer {
    fn name(&self) -> &str {
        "relay"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, PalaverError> {
        let handle = self.handle.lock().await;
        match handle.as_ref() {
            Some(h) if !h.is_finished() => Ok(HealthStatus::Healthy),
            _ => Ok(HealthStatus::Unhealthy("server not running".to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), PalaverError> {
        self.state.shutdown.cancel();
        self.wait().await
    }
}
