// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Palaver configuration.
//!
//! Every section rejects unknown keys. Loading collects all problems at once
//! (parse errors with source spans and key suggestions, then semantic checks)
//! so an operator can fix a file in one pass.
//!
//! ```no_run
//! let config = match palaver_config::load_and_validate() {
//!     Ok(config) => config,
//!     Err(errors) => {
//!         palaver_config::render_errors(&errors);
//!         std::process::exit(1);
//!     }
//! };
//! println!("relay on {}:{}", config.server.host, config.server.port);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, SourceFile, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{ClientConfig, PalaverConfig, StoreBackend, TransportKind};

/// Loads from the standard locations and validates.
pub fn load_and_validate() -> Result<PalaverConfig, Vec<ConfigError>> {
    checked(loader::load_config(), || {
        loader::search_paths()
            .iter()
            .filter_map(|path| SourceFile::read(path))
            .collect()
    })
}

/// Loads one explicit file (plus environment overrides) and validates.
pub fn load_and_validate_path(path: &Path) -> Result<PalaverConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_path(path), || {
        SourceFile::read(path).into_iter().collect()
    })
}

/// Loads a TOML string and validates.
pub fn load_and_validate_str(toml_content: &str) -> Result<PalaverConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_str(toml_content), || {
        vec![SourceFile::inline(toml_content)]
    })
}

/// Sources are only read back when there is an error to point into.
fn checked(
    loaded: Result<PalaverConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<SourceFile>,
) -> Result<PalaverConfig, Vec<ConfigError>> {
    let config = loaded.map_err(|err| diagnostic::from_figment(err, &sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}
