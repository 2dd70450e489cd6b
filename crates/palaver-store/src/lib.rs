// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat store backends for the Palaver chat relay.
//!
//! - [`MemoryStore`]: process-local, used for tests and single-node demos.
//! - [`CmsStore`]: the headless CMS item API, with presence falling back to
//!   a local [`PresenceFile`] when the settings singleton is unavailable.

pub mod cms;
pub mod memory;
pub mod presence_file;

use std::sync::Arc;

use palaver_config::PalaverConfig;
use palaver_config::model::StoreBackend;
use palaver_core::{ChatStore, PalaverError, PresenceState};
use tracing::info;

pub use cms::CmsStore;
pub use memory::MemoryStore;
pub use presence_file::PresenceFile;

/// Presence defaults taken from the `[presence]` section.
pub fn presence_defaults(config: &PalaverConfig) -> PresenceState {
    PresenceState {
        online: false,
        welcome_message: config.presence.welcome_message.clone(),
        offline_message: config.presence.offline_message.clone(),
    }
}

/// Builds the store selected by `[store].backend`.
pub fn build_store(config: &PalaverConfig) -> Result<Arc<dyn ChatStore>, PalaverError> {
    let defaults = presence_defaults(config);
    match config.store.backend {
        StoreBackend::Memory => {
            info!("using in-memory chat store");
            Ok(Arc::new(MemoryStore::new(defaults)))
        }
        StoreBackend::Cms => {
            let url = config
                .store
                .cms_url
                .as_deref()
                .ok_or_else(|| PalaverError::Config("store.cms_url is required".into()))?;
            let fallback = PresenceFile::new(config.store.presence_fallback_path(), defaults.clone());
            info!(url, fallback = %fallback.path().display(), "using CMS chat store");
            Ok(Arc::new(CmsStore::new(
                url,
                config.store.cms_token.as_deref(),
                config.store.request_timeout(),
                fallback,
                defaults,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn builds_memory_store_by_default() {
        let store = build_store(&PalaverConfig::default()).unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[test]
    #[traced_test]
    fn builds_cms_store_when_configured() {
        let mut config = PalaverConfig::default();
        config.store.backend = StoreBackend::Cms;
        config.store.cms_url = Some("http://127.0.0.1:8055".into());
        let store = build_store(&config).unwrap();
        assert_eq!(store.name(), "cms");
        assert!(logs_contain("using CMS chat store"));
    }

    #[test]
    fn cms_without_url_is_config_error() {
        let mut config = PalaverConfig::default();
        config.store.backend = StoreBackend::Cms;
        assert!(matches!(build_store(&config), Err(PalaverError::Config(_))));
    }
}
