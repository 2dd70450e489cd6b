// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local JSON file holding the presence record when the CMS singleton is unavailable.

use std::path::{Path, PathBuf};

use palaver_core::{PalaverError, PresenceState};
use tracing::debug;

/// Presence persisted as a single JSON object with the CMS field names.
#[derive(Debug, Clone)]
pub struct PresenceFile {
    path: PathBuf,
    defaults: PresenceState,
}

impl PresenceFile {
    /// A presence file at `path`; `defaults` is returned while the file does not exist.
    pub fn new(path: impl Into<PathBuf>, defaults: PresenceState) -> Self {
        Self {
            path: path.into(),
            defaults,
        }
    }

    /// Location of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored presence, or the defaults if nothing was stored yet.
    pub async fn load(&self) -> Result<PresenceState, PalaverError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(self.defaults.clone());
            }
            Err(e) => return Err(PalaverError::store("failed to read presence file", e)),
        };
        serde_json::from_str(&raw)
            .map_err(|e| PalaverError::store("presence file is not valid JSON", e))
    }

    /// Sets the online flag, keeping the stored texts.
    pub async fn store_online(&self, online: bool) -> Result<PresenceState, PalaverError> {
        let mut state = self.load().await?;
        state.online = online;
        self.save(&state).await?;
        Ok(state)
    }

    /// Overwrites the file with `state`.
    pub async fn save(&self, state: &PresenceState) -> Result<(), PalaverError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PalaverError::store("failed to create presence directory", e))?;
        }
        let body = serde_json::to_vec_pretty(state)
            .map_err(|e| PalaverError::Internal(format!("failed to encode presence: {e}")))?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| PalaverError::store("failed to write presence file", e))?;
        debug!(path = %self.path.display(), online = state.online, "presence written to fallback file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = PresenceFile::new(dir.path().join("presence.json"), PresenceState::default());
        assert_eq!(file.load().await.unwrap(), PresenceState::default());
    }

    #[tokio::test]
    async fn online_flag_persists_and_keeps_texts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("presence.json");
        let defaults = PresenceState {
            online: false,
            welcome_message: "hey".into(),
            offline_message: "away".into(),
        };
        let file = PresenceFile::new(&path, defaults);

        let state = file.store_online(true).await.unwrap();
        assert!(state.online);
        assert_eq!(state.welcome_message, "hey");

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["admin_online"], true);

        let reopened = PresenceFile::new(&path, PresenceState::default());
        assert!(reopened.load().await.unwrap().online);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presence.json");
        std::fs::write(&path, "{nope").unwrap();
        let file = PresenceFile::new(&path, PresenceState::default());
        assert!(matches!(file.load().await, Err(PalaverError::Store { .. })));
    }
}
