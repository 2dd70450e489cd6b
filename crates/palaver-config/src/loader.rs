// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading.
//!
//! Compiled defaults, then every file from [`search_paths`] that exists (later
//! files win), then `PALAVER_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is not ours to box

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::PalaverConfig;

/// Config sections, used to map `PALAVER_<SECTION>_<KEY>` to `section.key`.
const SECTIONS: &[&str] = &["server", "store", "relay", "presence", "client"];

/// Files consulted by [`load_config`], lowest precedence first: system-wide,
/// then the user's XDG config directory, then the working directory.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/palaver/palaver.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("palaver").join("palaver.toml"));
    }
    paths.push(PathBuf::from("palaver.toml"));
    paths
}

fn defaults() -> Figment {
    Figment::from(Serialized::defaults(PalaverConfig::default()))
}

/// Loads from [`search_paths`] plus environment overrides.
pub fn load_config() -> Result<PalaverConfig, figment::Error> {
    build_figment().extract()
}

/// Loads from a TOML string alone; no files, no environment.
pub fn load_config_from_str(toml_content: &str) -> Result<PalaverConfig, figment::Error> {
    defaults().merge(Toml::string(toml_content)).extract()
}

/// Loads one explicit file plus environment overrides. A missing file is skipped.
pub fn load_config_from_path(path: &Path) -> Result<PalaverConfig, figment::Error> {
    defaults()
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The figment behind [`load_config`].
pub fn build_figment() -> Figment {
    search_paths()
        .into_iter()
        .fold(defaults(), |figment, path| figment.merge(Toml::file(path)))
        .merge(env_provider())
}

/// Maps a lowercased, prefix-stripped env var name to a dotted config path.
///
/// Only the leading section name is split off, so `client_relay_url` becomes
/// `client.relay_url` and never `client.relay.url`. Names without a known
/// section are returned unchanged and rejected later as unknown keys.
pub fn env_key_path(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

/// `PALAVER_SERVER_ADMIN_TOKEN` → `server.admin_token`; see [`env_key_path`].
fn env_provider() -> Env {
    Env::prefixed("PALAVER_").map(|key| env_key_path(key.as_str()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(env_key_path("server_admin_token"), "server.admin_token");
        assert_eq!(env_key_path("client_relay_url"), "client.relay_url");
        assert_eq!(
            env_key_path("client_reconnect_max_attempts"),
            "client.reconnect_max_attempts"
        );
        assert_eq!(env_key_path("store_cms_url"), "store.cms_url");
        assert_eq!(env_key_path("unrelated"), "unrelated");
    }

    #[test]
    fn local_file_has_highest_precedence() {
        let paths = search_paths();
        assert_eq!(paths.first(), Some(&PathBuf::from("/etc/palaver/palaver.toml")));
        assert_eq!(paths.last(), Some(&PathBuf::from("palaver.toml")));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config_from_path(Path::new("/nonexistent/palaver.toml"))
            .expect("missing file should be skipped");
        assert_eq!(config.server.host, "127.0.0.1");
    }
}
