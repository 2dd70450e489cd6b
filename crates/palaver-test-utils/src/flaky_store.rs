// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fault-injecting store wrapper.
//!
//! `FlakyStore` forwards to an in-memory store but can be told to fail
//! specific operations, and counts every call so tests can assert that a
//! timer stopped touching the store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use palaver_core::{
    AdapterType, ChatMessage, ChatSession, ChatStore, HealthStatus, NewMessage, NewSession,
    PalaverError, PluginAdapter, PresenceState, SessionField, SessionId,
};
use palaver_store::MemoryStore;

/// The store operations that can be observed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CreateSession,
    ReadSession,
    UpdateSession,
    CreateMessage,
    ListMessages,
    ReadPresence,
    WritePresence,
}

#[derive(Debug, Default)]
struct Faults {
    calls: HashMap<StoreOp, usize>,
    fail_next: HashMap<StoreOp, usize>,
    fail_always: Vec<StoreOp>,
}

/// A [`MemoryStore`] with failure injection and call counting.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    faults: Mutex<Faults>,
}

impl FlakyStore {
    pub fn new(presence: PresenceState) -> Self {
        Self {
            inner: MemoryStore::new(presence),
            faults: Mutex::default(),
        }
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The wrapped store, for seeding state behind the relay's back.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Fails the next `times` calls of `op`.
    pub fn fail_next(&self, op: StoreOp, times: usize) {
        *self.faults().fail_next.entry(op).or_default() += times;
    }

    /// Fails every call of `op` until [`FlakyStore::heal`].
    pub fn fail_always(&self, op: StoreOp) {
        self.faults().fail_always.push(op);
    }

    /// Clears every injected fault.
    pub fn heal(&self) {
        let mut faults = self.faults();
        faults.fail_next.clear();
        faults.fail_always.clear();
    }

    /// Number of calls of `op` so far, failed ones included.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.faults().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of stored messages.
    pub fn message_count(&self) -> usize {
        self.inner.message_count()
    }

    fn enter(&self, op: StoreOp) -> Result<(), PalaverError> {
        let mut faults = self.faults();
        *faults.calls.entry(op).or_default() += 1;
        if faults.fail_always.contains(&op) {
            return Err(injected(op));
        }
        match faults.fail_next.get_mut(&op) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(injected(op))
            }
            _ => Ok(()),
        }
    }
}

fn injected(op: StoreOp) -> PalaverError {
    PalaverError::Store {
        message: format!("injected failure in {op:?}"),
        source: None,
    }
}

#[async_trait]
impl PluginAdapter for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, PalaverError> {
        let faults = self.faults();
        if faults.fail_always.is_empty() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded(format!(
                "failing: {:?}",
                faults.fail_always
            )))
        }
    }

    async fn shutdown(&self) -> Result<(), PalaverError> {
        Ok(())
    }
}

#[async_trait]
impl ChatStore for FlakyStore {
    async fn create_session(&self, new: NewSession) -> Result<ChatSession, PalaverError> {
        self.enter(StoreOp::CreateSession)?;
        self.inner.create_session(new).await
    }

    async fn read_session(&self, id: SessionId) -> Result<ChatSession, PalaverError> {
        self.enter(StoreOp::ReadSession)?;
        self.inner.read_session(id).await
    }

    async fn update_session_field(
        &self,
        id: SessionId,
        field: SessionField,
    ) -> Result<(), PalaverError> {
        self.enter(StoreOp::UpdateSession)?;
        self.inner.update_session_field(id, field).await
    }

    async fn create_message(&self, new: NewMessage) -> Result<ChatMessage, PalaverError> {
        self.enter(StoreOp::CreateMessage)?;
        self.inner.create_message(new).await
    }

    async fn list_messages(
        &self,
        session: SessionId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChatMessage>, PalaverError> {
        self.enter(StoreOp::ListMessages)?;
        self.inner.list_messages(session, since).await
    }

    async fn read_presence(&self) -> Result<PresenceState, PalaverError> {
        self.enter(StoreOp::ReadPresence)?;
        self.inner.read_presence().await
    }

    async fn write_presence(&self, online: bool) -> Result<(), PalaverError> {
        self.enter(StoreOp::WritePresence)?;
        self.inner.write_presence(online).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::Sender;

    async fn session(store: &FlakyStore) -> SessionId {
        store
            .create_session(NewSession {
                visitor_name: "V".into(),
                visitor_email: "v@example.com".into(),
                visitor_phone: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn fail_next_is_consumed() {
        let store = FlakyStore::default();
        let id = session(&store).await;
        store.fail_next(StoreOp::CreateMessage, 1);

        let msg = NewMessage::new(id, Sender::Visitor, "hi").unwrap();
        assert!(store.create_message(msg.clone()).await.is_err());
        assert!(store.create_message(msg).await.is_ok());
        assert_eq!(store.calls(StoreOp::CreateMessage), 2);
        assert_eq!(store.message_count(), 1);
    }

    #[tokio::test]
    async fn fail_always_until_healed() {
        let store = FlakyStore::default();
        store.fail_always(StoreOp::ReadPresence);
        assert!(store.read_presence().await.is_err());
        assert!(store.read_presence().await.is_err());
        assert!(matches!(
            store.health_check().await.unwrap(),
            HealthStatus::Degraded(_)
        ));
        store.heal();
        assert!(store.read_presence().await.is_ok());
    }
}
