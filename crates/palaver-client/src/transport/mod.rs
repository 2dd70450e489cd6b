// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live transports behind the bridge.
//!
//! The self-hosted relay is the primary transport; the CMS item subscription
//! is an alternative carrying the same events. Both are driven through
//! [`Connector`] and [`Transport`] so the bridge never knows which one it has.

pub mod cms;
pub mod relay;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use palaver_core::{ChatMessage, PalaverError, Sender, SessionId};

pub use cms::CmsConnector;
pub use relay::RelayConnector;

/// Something a live transport observed.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Full ordered history of the joined session.
    Snapshot(Vec<ChatMessage>),
    /// One message, possibly already seen.
    Message(ChatMessage),
    /// Explicit typing assertion by `sender`.
    Typing { sender: Sender, is_typing: bool },
    /// Typing timestamp written by `sender`; `None` means cleared.
    TypingAt {
        sender: Sender,
        at: Option<DateTime<Utc>>,
    },
    /// Operator presence.
    Presence(bool),
    /// The session was closed by an operator.
    SessionClosed(SessionId),
    /// The far end rejected something we sent.
    Rejected(String),
}

/// One established live connection.
///
/// [`Transport::next_event`] must be cancel safe: the bridge polls it inside
/// `tokio::select!`.
#[async_trait]
pub trait Transport: Send {
    /// Subscribes to presence without joining a session.
    async fn subscribe_presence(&mut self) -> Result<(), PalaverError>;

    /// Joins `session`, leaving any previous one. A snapshot follows.
    async fn join(&mut self, session: SessionId) -> Result<(), PalaverError>;

    async fn send_message(
        &mut self,
        session: SessionId,
        sender: Sender,
        body: &str,
    ) -> Result<(), PalaverError>;

    async fn send_typing(
        &mut self,
        session: SessionId,
        sender: Sender,
        is_typing: bool,
    ) -> Result<(), PalaverError>;

    /// The next event, or `None` once the connection is gone.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Closes the connection. Errors are ignored.
    async fn close(&mut self);
}

/// Opens [`Transport`]s. Called once per connect or reconnect attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn connect(&self) -> Result<Box<dyn Transport>, PalaverError>;
}
