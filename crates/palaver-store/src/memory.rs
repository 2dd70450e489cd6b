// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process implementation of the [`ChatStore`] trait.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use palaver_core::{
    AdapterType, ChatMessage, ChatSession, ChatStore, HealthStatus, MessageId, NewMessage,
    NewSession, PalaverError, PluginAdapter, PresenceState, SessionField, SessionId,
    SessionStatus,
};

#[derive(Debug)]
struct Inner {
    sessions: BTreeMap<SessionId, ChatSession>,
    messages: Vec<ChatMessage>,
    presence: PresenceState,
    next_session: u64,
    next_message: u64,
    last_stamp: Option<DateTime<Utc>>,
}

impl Inner {
    /// Wall-clock time, bumped so that no two stamps are equal.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn session_mut(&mut self, id: SessionId) -> Result<&mut ChatSession, PalaverError> {
        self.sessions.get_mut(&id).ok_or_else(|| PalaverError::NotFound {
            kind: "session",
            id: id.to_string(),
        })
    }
}

/// Process-local store. State lives as long as the value.
///
/// Message timestamps are strictly increasing, so creation order and
/// timestamp order agree.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(PresenceState::default())
    }
}

impl MemoryStore {
    /// A new empty store starting from `presence`.
    pub fn new(presence: PresenceState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: BTreeMap::new(),
                messages: Vec::new(),
                presence,
                next_session: 1,
                next_message: 1,
                last_stamp: None,
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, PalaverError> {
        self.inner
            .lock()
            .map_err(|_| PalaverError::Internal("memory store lock poisoned".into()))
    }

    /// Number of stored messages across all sessions.
    pub fn message_count(&self) -> usize {
        self.lock().map(|inner| inner.messages.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, PalaverError> {
        self.lock()?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PalaverError> {
        Ok(())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create_session(&self, new: NewSession) -> Result<ChatSession, PalaverError> {
        let mut inner = self.lock()?;
        let id = SessionId(inner.next_session);
        inner.next_session += 1;
        let now = inner.stamp();
        let session = ChatSession {
            id,
            visitor_name: new.visitor_name,
            visitor_email: new.visitor_email,
            visitor_phone: new.visitor_phone,
            status: SessionStatus::Active,
            last_message_at: Some(now),
            admin_typing_at: None,
            visitor_typing_at: None,
        };
        inner.sessions.insert(id, session.clone());
        debug!(session_id = %id, "session created");
        Ok(session)
    }

    async fn read_session(&self, id: SessionId) -> Result<ChatSession, PalaverError> {
        let mut inner = self.lock()?;
        inner.session_mut(id).map(|s| s.clone())
    }

    async fn update_session_field(
        &self,
        id: SessionId,
        field: SessionField,
    ) -> Result<(), PalaverError> {
        let mut inner = self.lock()?;
        inner.session_mut(id)?.apply(&field)
    }

    async fn create_message(&self, new: NewMessage) -> Result<ChatMessage, PalaverError> {
        let mut inner = self.lock()?;
        inner.session_mut(new.session)?;
        let id = MessageId(inner.next_message);
        inner.next_message += 1;
        let created_at = inner.stamp();
        let message = ChatMessage {
            id,
            session: Some(new.session),
            sender: new.sender,
            body: new.body,
            created_at,
            read: false,
        };
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        session: SessionId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChatMessage>, PalaverError> {
        let inner = self.lock()?;
        let mut out: Vec<ChatMessage> = inner
            .messages
            .iter()
            .filter(|m| m.session == Some(session))
            .filter(|m| since.is_none_or(|s| m.created_at > s))
            .cloned()
            .collect();
        out.sort_by_key(|m| (m.created_at, m.id));
        Ok(out)
    }

    async fn read_presence(&self) -> Result<PresenceState, PalaverError> {
        Ok(self.lock()?.presence.clone())
    }

    async fn write_presence(&self, online: bool) -> Result<(), PalaverError> {
        self.lock()?.presence.online = online;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::Sender;

    fn visitor() -> NewSession {
        NewSession {
            visitor_name: "Ada".into(),
            visitor_email: "ada@example.com".into(),
            visitor_phone: None,
        }
    }

    #[tokio::test]
    async fn messages_list_in_creation_order() {
        let store = MemoryStore::default();
        let s = store.create_session(visitor()).await.unwrap().id;
        for body in ["one", "two", "three"] {
            store
                .create_message(NewMessage::new(s, Sender::Visitor, body).unwrap())
                .await
                .unwrap();
        }
        let bodies: Vec<_> = store
            .list_messages(s, None)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn since_is_strictly_after() {
        let store = MemoryStore::default();
        let s = store.create_session(visitor()).await.unwrap().id;
        let first = store
            .create_message(NewMessage::new(s, Sender::Visitor, "a").unwrap())
            .await
            .unwrap();
        store
            .create_message(NewMessage::new(s, Sender::Admin, "b").unwrap())
            .await
            .unwrap();
        let newer = store.list_messages(s, Some(first.created_at)).await.unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].body, "b");
        assert!(!newer[0].read);
    }

    #[tokio::test]
    async fn messages_are_scoped_to_session() {
        let store = MemoryStore::default();
        let a = store.create_session(visitor()).await.unwrap().id;
        let b = store.create_session(visitor()).await.unwrap().id;
        store
            .create_message(NewMessage::new(a, Sender::Visitor, "for a").unwrap())
            .await
            .unwrap();
        assert!(store.list_messages(b, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let store = MemoryStore::default();
        assert!(matches!(
            store.read_session(SessionId(99)).await,
            Err(PalaverError::NotFound { .. })
        ));
        let msg = NewMessage::new(SessionId(99), Sender::Visitor, "hi").unwrap();
        assert!(store.create_message(msg).await.is_err());
        assert_eq!(store.message_count(), 0);
    }

    #[tokio::test]
    async fn status_updates_follow_lifecycle() {
        let store = MemoryStore::default();
        let s = store.create_session(visitor()).await.unwrap().id;
        store
            .update_session_field(s, SessionField::Status(SessionStatus::Closed))
            .await
            .unwrap();
        let err = store
            .update_session_field(s, SessionField::Status(SessionStatus::Active))
            .await
            .unwrap_err();
        assert!(matches!(err, PalaverError::InvalidTransition { .. }));
        assert_eq!(
            store.read_session(s).await.unwrap().status,
            SessionStatus::Closed
        );
    }

    #[tokio::test]
    async fn typing_timestamp_set_and_cleared() {
        let store = MemoryStore::default();
        let s = store.create_session(visitor()).await.unwrap().id;
        let at = Utc::now();
        store
            .update_session_field(
                s,
                SessionField::TypingAt {
                    role: Sender::Admin,
                    at: Some(at),
                },
            )
            .await
            .unwrap();
        assert_eq!(store.read_session(s).await.unwrap().admin_typing_at, Some(at));
        store
            .update_session_field(
                s,
                SessionField::TypingAt {
                    role: Sender::Admin,
                    at: None,
                },
            )
            .await
            .unwrap();
        assert!(store.read_session(s).await.unwrap().admin_typing_at.is_none());
    }

    #[tokio::test]
    async fn presence_round_trip() {
        let store = MemoryStore::default();
        assert!(!store.read_presence().await.unwrap().online);
        store.write_presence(true).await.unwrap();
        assert!(store.read_presence().await.unwrap().online);
    }
}
