// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Palaver configuration system.

use palaver_config::diagnostic::ConfigError;
use palaver_config::model::{PalaverConfig, StoreBackend, TransportKind};
use palaver_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[server]
host = "0.0.0.0"
port = 8080
admin_token = "letmein"
log_level = "debug"

[store]
backend = "cms"
cms_url = "https://cms.example.com"
cms_token = "static"
presence_fallback_path = "/var/lib/palaver/presence.json"
request_timeout_secs = 3

[relay]
freshness_poll_ms = 500
outbound_buffer = 16
allow_ws_status_change = false

[presence]
welcome_message = "Hello"
offline_message = "Away"

[client]
transport = "cms"
cms_realtime_url = "wss://cms.example.com/websocket"
token_url = "https://site.example.com/api/chat/token"
reconnect_max_attempts = 3
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should validate");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.admin_token.as_deref(), Some("letmein"));
    assert_eq!(config.store.backend, StoreBackend::Cms);
    assert_eq!(config.store.request_timeout_secs, 3);
    assert_eq!(config.relay.outbound_buffer, 16);
    assert!(!config.relay.allow_ws_status_change);
    assert_eq!(config.presence.welcome_message, "Hello");
    assert_eq!(config.client.transport, TransportKind::Cms);
    assert_eq!(config.client.reconnect_max_attempts, 3);
    // untouched keys keep defaults
    assert_eq!(config.client.session_poll_ms, 2500);
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");
    assert_eq!(config, PalaverConfig::default());
}

#[test]
fn unknown_key_suggests_correction() {
    let toml = r#"
[server]
prot = 9000
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown key");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "prot"
                && suggestion.as_deref() == Some("port")
                && valid_keys.contains("admin_token")
        })
    });
    assert!(found, "expected UnknownKey for `prot`, got: {errors:?}");
}

#[test]
fn unknown_top_level_section_rejected() {
    let err = load_config_from_str("[logging]\nlevel = \"debug\"\n")
        .expect_err("unknown section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("logging"),
        "got: {err_str}"
    );
}

#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[relay]
freshness_poll_ms = "fast"
"#;
    let errors = load_and_validate_str(toml).expect_err("should reject invalid type");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("freshness_poll_ms"))),
        "got: {errors:?}"
    );
}

#[test]
fn unknown_backend_is_reported() {
    let toml = r#"
[store]
backend = "sqlite"
"#;
    let errors = load_and_validate_str(toml).expect_err("should reject unknown backend");
    assert!(!errors.is_empty());
}

#[test]
fn validation_runs_after_parse() {
    let toml = r#"
[store]
backend = "cms"
"#;
    let errors = load_and_validate_str(toml).expect_err("cms without url should fail");
    assert!(errors.iter().any(
        |e| matches!(e, ConfigError::Validation { message } if message.contains("store.cms_url"))
    ));
}

#[test]
fn dotted_override_reaches_underscored_key() {
    use figment::{Figment, providers::Serialized};

    let config: PalaverConfig = Figment::new()
        .merge(Serialized::defaults(PalaverConfig::default()))
        .merge((
            palaver_config::loader::env_key_path("server_admin_token"),
            "from-env",
        ))
        .extract()
        .expect("override should merge");

    assert_eq!(config.server.admin_token.as_deref(), Some("from-env"));
}

#[test]
fn loads_from_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("palaver.toml");
    std::fs::write(&path, "[server]\nport = 4100\n").unwrap();

    let config = load_and_validate_path(&path).expect("file should load");
    assert_eq!(config.server.port, 4100);
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "prot".to_string(),
        suggestion: Some("port".to_string()),
        valid_keys: "host, port, admin_token, log_level".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some());
    let help = error.help().expect("should have help").to_string();
    assert!(help.contains("did you mean `port`"), "got: {help}");

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render");
    assert!(buf.contains("prot"));
}
