// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process relay on an ephemeral port.
//!
//! `TestRelay` wires a [`FlakyStore`] into a real relay server bound to
//! `127.0.0.1:0`, so tests speak real WebSocket and HTTP to it.

use std::sync::Arc;
use std::time::Duration;

use palaver_core::{ChatStore, NewSession, PalaverError, SessionId};
use palaver_relay::{AdminAuth, Relay, RelayOptions, RelayServer, RelayState};

use crate::flaky_store::FlakyStore;
use crate::ws_client::WsTestClient;

/// Admin token every [`TestRelay`] accepts unless overridden.
pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

/// Builder for a [`TestRelay`].
pub struct TestRelayBuilder {
    admin_token: Option<String>,
    options: RelayOptions,
}

impl TestRelayBuilder {
    fn new() -> Self {
        Self {
            admin_token: Some(TEST_ADMIN_TOKEN.to_string()),
            options: RelayOptions::default(),
        }
    }

    /// Replaces the admin token; `None` disables admin access.
    pub fn admin_token(mut self, token: Option<&str>) -> Self {
        self.admin_token = token.map(str::to_string);
        self
    }

    /// Sets the freshness poll period.
    pub fn freshness_poll(mut self, period: Duration) -> Self {
        self.options.freshness_poll = period;
        self
    }

    /// Allows or forbids presence changes over the socket.
    pub fn allow_ws_status_change(mut self, allow: bool) -> Self {
        self.options.allow_ws_status_change = allow;
        self
    }

    /// Binds and starts the relay.
    pub async fn start(mut self) -> Result<TestRelay, PalaverError> {
        self.options.verify_admin_sender = self.admin_token.is_some();
        let store = Arc::new(FlakyStore::new(self.options.presence_defaults.clone()));
        let relay = Relay::new(store.clone(), self.options);
        let state = RelayState::new(relay, AdminAuth::new(self.admin_token.as_deref()));
        let listener = palaver_relay::bind("127.0.0.1", 0).await?;
        let server = RelayServer::start(listener, state)?;
        Ok(TestRelay { server, store })
    }
}

/// A running relay plus the store behind it.
pub struct TestRelay {
    server: RelayServer,
    store: Arc<FlakyStore>,
}

impl TestRelay {
    pub fn builder() -> TestRelayBuilder {
        TestRelayBuilder::new()
    }

    /// Starts a relay with default settings.
    pub async fn start() -> Result<Self, PalaverError> {
        Self::builder().start().await
    }

    pub fn store(&self) -> &Arc<FlakyStore> {
        &self.store
    }

    pub fn relay(&self) -> &Relay {
        self.server.relay()
    }

    /// `ws://` URL of the socket endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.server.local_addr())
    }

    /// `http://` base URL.
    pub fn http_url(&self) -> String {
        format!("http://{}", self.server.local_addr())
    }

    /// Opens a visitor connection.
    pub async fn connect(&self) -> Result<WsTestClient, PalaverError> {
        WsTestClient::connect(&self.ws_url()).await
    }

    /// Opens a connection presenting the admin token.
    pub async fn connect_admin(&self) -> Result<WsTestClient, PalaverError> {
        WsTestClient::connect_with_token(&self.ws_url(), Some(TEST_ADMIN_TOKEN)).await
    }

    /// Creates a session directly in the store.
    pub async fn create_session(&self, name: &str) -> Result<SessionId, PalaverError> {
        let session = self
            .store
            .create_session(NewSession {
                visitor_name: name.to_string(),
                visitor_email: format!("{}@example.com", name.to_lowercase()),
                visitor_phone: None,
            })
            .await?;
        Ok(session.id)
    }

    /// Stops the server and waits for it.
    pub async fn shutdown(self) -> Result<(), PalaverError> {
        self.server.shutdown_token().cancel();
        self.server.wait().await
    }
}
