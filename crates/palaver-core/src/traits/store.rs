// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store adapter trait for sessions, messages and operator presence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PalaverError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ChatMessage, ChatSession, NewMessage, NewSession, PresenceState, SessionField, SessionId,
};

/// Persistence backend for chat state.
///
/// The relay treats the store as the source of truth: every message is
/// written here before it is fanned out, and presence reads always come from
/// here rather than from a cached copy.
#[async_trait]
pub trait ChatStore: PluginAdapter {
    /// Creates a new session in the `active` state.
    async fn create_session(&self, new: NewSession) -> Result<ChatSession, PalaverError>;

    /// Reads one session. Unknown ids yield [`PalaverError::NotFound`].
    async fn read_session(&self, id: SessionId) -> Result<ChatSession, PalaverError>;

    /// Updates a single field of a session.
    ///
    /// Status updates are checked against the session lifecycle.
    async fn update_session_field(
        &self,
        id: SessionId,
        field: SessionField,
    ) -> Result<(), PalaverError>;

    /// Persists a message and returns it with its assigned id and timestamp.
    async fn create_message(&self, new: NewMessage) -> Result<ChatMessage, PalaverError>;

    /// Lists a session's messages ordered by creation time ascending.
    ///
    /// With `since`, only messages created strictly after it are returned.
    async fn list_messages(
        &self,
        session: SessionId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChatMessage>, PalaverError>;

    /// Reads the global operator presence record.
    async fn read_presence(&self) -> Result<PresenceState, PalaverError>;

    /// Writes the operator online flag.
    async fn write_presence(&self, online: bool) -> Result<(), PalaverError>;
}
