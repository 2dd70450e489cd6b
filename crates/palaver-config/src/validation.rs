// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Checks that need more than one field or a range: required CMS settings,
//! positive intervals, backoff bounds.

use crate::diagnostic::ConfigError;
use crate::model::{PalaverConfig, StoreBackend, TransportKind};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Collects every problem rather than stopping at the first.
pub fn validate_config(config: &PalaverConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::validation(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            )));
        }
    }

    if config.server.port == 0 {
        errors.push(ConfigError::validation("server.port must not be 0"));
    }

    if !LOG_LEVELS.contains(&config.server.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "server.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.server.log_level
        )));
    }

    if config.server.admin_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
        errors.push(ConfigError::validation(
            "server.admin_token must not be empty when set",
        ));
    }

    if config.store.backend == StoreBackend::Cms
        && config.store.cms_url.as_deref().is_none_or(|u| u.trim().is_empty())
    {
        errors.push(ConfigError::validation(
            "store.cms_url is required when store.backend = \"cms\"",
        ));
    }

    if config.client.transport == TransportKind::Cms
        && config
            .client
            .cms_realtime_url
            .as_deref()
            .is_none_or(|u| u.trim().is_empty())
    {
        errors.push(ConfigError::validation(
            "client.cms_realtime_url is required when client.transport = \"cms\"",
        ));
    }

    let positive = [
        ("store.request_timeout_secs", config.store.request_timeout_secs),
        ("relay.freshness_poll_ms", config.relay.freshness_poll_ms),
        ("relay.outbound_buffer", config.relay.outbound_buffer as u64),
        ("client.handshake_timeout_ms", config.client.handshake_timeout_ms),
        ("client.reconnect_base_ms", config.client.reconnect_base_ms),
        ("client.reconnect_max_ms", config.client.reconnect_max_ms),
        ("client.session_poll_ms", config.client.session_poll_ms),
        ("client.presence_poll_ms", config.client.presence_poll_ms),
        ("client.typing_debounce_ms", config.client.typing_debounce_ms),
        ("client.typing_freshness_ms", config.client.typing_freshness_ms),
    ];
    for (key, value) in positive {
        if value == 0 {
            errors.push(ConfigError::validation(format!("{key} must be positive")));
        }
    }

    if config.client.reconnect_base_ms > config.client.reconnect_max_ms {
        errors.push(ConfigError::validation(format!(
            "client.reconnect_base_ms ({}) must not exceed client.reconnect_max_ms ({})",
            config.client.reconnect_base_ms, config.client.reconnect_max_ms
        )));
    }

    if config.client.reconnect_max_attempts < 1 {
        errors.push(ConfigError::validation(
            "client.reconnect_max_attempts must be at least 1",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_message(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&PalaverConfig::default()).is_ok());
    }

    #[test]
    fn cms_backend_requires_url() {
        let mut config = PalaverConfig::default();
        config.store.backend = StoreBackend::Cms;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "store.cms_url"));

        config.store.cms_url = Some("https://cms.example.com".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_port_and_empty_host_fail() {
        let mut config = PalaverConfig::default();
        config.server.port = 0;
        config.server.host = "  ".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "server.port"));
        assert!(has_message(&errors, "server.host"));
    }

    #[test]
    fn backoff_base_above_cap_fails() {
        let mut config = PalaverConfig::default();
        config.client.reconnect_base_ms = 20_000;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "reconnect_base_ms"));
    }

    #[test]
    fn collects_every_error() {
        let mut config = PalaverConfig::default();
        config.relay.freshness_poll_ms = 0;
        config.client.reconnect_max_attempts = 0;
        config.server.log_level = "loud".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3, "{errors:?}");
    }
}
