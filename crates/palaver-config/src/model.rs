// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Palaver chat relay.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Placeholder written over secrets when a configuration is displayed.
pub const REDACTED: &str = "[redacted]";

/// Top-level Palaver configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PalaverConfig {
    /// Listener and admin credential settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Message/session store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Socket relay tuning.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Canned presence texts.
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Bridge client settings.
    #[serde(default)]
    pub client: ClientConfig,
}

impl PalaverConfig {
    /// A copy safe to print: bearer credentials are replaced with [`REDACTED`].
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.server.admin_token.is_some() {
            copy.server.admin_token = Some(REDACTED.to_string());
        }
        if copy.store.cms_token.is_some() {
            copy.store.cms_token = Some(REDACTED.to_string());
        }
        copy
    }
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token for admin endpoints and admin WebSocket peers.
    /// `None` leaves the admin surface closed.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_token: None,
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Which store backs the relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store; state is lost on restart.
    #[default]
    Memory,
    /// Headless CMS item API.
    Cms,
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Base URL of the CMS REST API. Required for the `cms` backend.
    #[serde(default)]
    pub cms_url: Option<String>,

    /// Static bearer token for the CMS REST API.
    #[serde(default)]
    pub cms_token: Option<String>,

    /// JSON file holding presence when the CMS presence singleton is unavailable.
    /// Defaults to `$XDG_DATA_HOME/palaver/presence.json`.
    #[serde(default)]
    pub presence_fallback_path: Option<String>,

    /// Per-request timeout against the CMS.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            cms_url: None,
            cms_token: None,
            presence_fallback_path: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl StoreConfig {
    /// The presence fallback file, resolving the XDG default.
    pub fn presence_fallback_path(&self) -> PathBuf {
        match &self.presence_fallback_path {
            Some(p) => PathBuf::from(p),
            None => dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("palaver")
                .join("presence.json"),
        }
    }

    /// Per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Socket relay tuning.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Period of the per-session freshness poll.
    #[serde(default = "default_freshness_poll_ms")]
    pub freshness_poll_ms: u64,

    /// Capacity of each peer's outbound frame queue.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Whether admin peers may toggle presence over the socket.
    #[serde(default = "default_true")]
    pub allow_ws_status_change: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            freshness_poll_ms: default_freshness_poll_ms(),
            outbound_buffer: default_outbound_buffer(),
            allow_ws_status_change: true,
        }
    }
}

impl RelayConfig {
    /// Freshness poll period as a [`Duration`].
    pub fn freshness_poll(&self) -> Duration {
        Duration::from_millis(self.freshness_poll_ms)
    }
}

fn default_freshness_poll_ms() -> u64 {
    1500
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_true() -> bool {
    true
}

/// Presence texts used when the store holds none.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceConfig {
    /// Greeting shown to visitors before first contact.
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,

    /// Notice shown to visitors while no operator is online.
    #[serde(default = "default_offline_message")]
    pub offline_message: String,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            welcome_message: default_welcome_message(),
            offline_message: default_offline_message(),
        }
    }
}

fn default_welcome_message() -> String {
    "Hi! How can we help you today?".to_string()
}

fn default_offline_message() -> String {
    "We're currently offline. Please leave your contact info and we'll get back to you shortly!"
        .to_string()
}

/// Which live channel the bridge client prefers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// The self-hosted socket relay.
    #[default]
    Relay,
    /// The CMS item-subscription channel.
    Cms,
}

/// Bridge client configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// WebSocket URL of the relay.
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    /// Base URL of the relay's HTTP polling surface.
    #[serde(default = "default_http_url")]
    pub http_url: String,

    /// Live transport selection.
    #[serde(default)]
    pub transport: TransportKind,

    /// WebSocket URL of the CMS realtime channel. Required for the `cms` transport.
    #[serde(default)]
    pub cms_realtime_url: Option<String>,

    /// Endpoint issuing bearer tokens for authenticated CMS subscriptions.
    #[serde(default)]
    pub token_url: Option<String>,

    /// Bound on the initial transport handshake.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// First reconnect delay; doubles per attempt.
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Reconnect delay cap.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Reconnect attempts before falling back to polling for good.
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,

    /// Poll interval while bound to a session.
    #[serde(default = "default_session_poll_ms")]
    pub session_poll_ms: u64,

    /// Poll interval while only watching presence.
    #[serde(default = "default_presence_poll_ms")]
    pub presence_poll_ms: u64,

    /// Trailing quiet period before `typing(false)` is sent.
    #[serde(default = "default_typing_debounce_ms")]
    pub typing_debounce_ms: u64,

    /// How long an observed typing assertion stays valid.
    #[serde(default = "default_typing_freshness_ms")]
    pub typing_freshness_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            http_url: default_http_url(),
            transport: TransportKind::default(),
            cms_realtime_url: None,
            token_url: None,
            handshake_timeout_ms: default_handshake_timeout_ms(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            session_poll_ms: default_session_poll_ms(),
            presence_poll_ms: default_presence_poll_ms(),
            typing_debounce_ms: default_typing_debounce_ms(),
            typing_freshness_ms: default_typing_freshness_ms(),
        }
    }
}

impl ClientConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn session_poll(&self) -> Duration {
        Duration::from_millis(self.session_poll_ms)
    }

    pub fn presence_poll(&self) -> Duration {
        Duration::from_millis(self.presence_poll_ms)
    }

    pub fn typing_debounce(&self) -> Duration {
        Duration::from_millis(self.typing_debounce_ms)
    }

    pub fn typing_freshness(&self) -> Duration {
        Duration::from_millis(self.typing_freshness_ms)
    }
}

fn default_relay_url() -> String {
    "ws://127.0.0.1:3000/ws".to_string()
}

fn default_http_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    5000
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_reconnect_max_ms() -> u64 {
    15_000
}

fn default_reconnect_max_attempts() -> u32 {
    10
}

fn default_session_poll_ms() -> u64 {
    2500
}

fn default_presence_poll_ms() -> u64 {
    8000
}

fn default_typing_debounce_ms() -> u64 {
    1200
}

fn default_typing_freshness_ms() -> u64 {
    4000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_values() {
        let config = PalaverConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.relay.freshness_poll_ms, 1500);
        assert_eq!(config.client.reconnect_max_attempts, 10);
        assert_eq!(config.client.typing_freshness_ms, 4000);
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn redacted_hides_tokens_only_when_present() {
        let mut config = PalaverConfig::default();
        assert_eq!(config.redacted(), config);

        config.server.admin_token = Some("s3cret".into());
        config.store.cms_token = Some("cms".into());
        let shown = config.redacted();
        assert_eq!(shown.server.admin_token.as_deref(), Some(REDACTED));
        assert_eq!(shown.store.cms_token.as_deref(), Some(REDACTED));
    }

    #[test]
    fn explicit_fallback_path_wins() {
        let store = StoreConfig {
            presence_fallback_path: Some("/tmp/p.json".into()),
            ..StoreConfig::default()
        };
        assert_eq!(store.presence_fallback_path(), PathBuf::from("/tmp/p.json"));
        assert!(
            StoreConfig::default()
                .presence_fallback_path()
                .ends_with("palaver/presence.json")
        );
    }
}
