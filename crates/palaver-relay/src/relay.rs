// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The relay hub: per-connection frame handling plus the operations the HTTP
//! surface shares with it.
//!
//! Every store call happens before the corresponding fan-out, and every
//! failure is answered to the requesting peer only. Nothing here can take
//! down another peer or session.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use palaver_config::PalaverConfig;
use palaver_core::protocol::{CreateSessionRequest, PollRequest, PollResponse, SessionValidity};
use palaver_core::{
    ChatMessage, ChatSession, ChatStore, ClientFrame, ErrorClass, HealthStatus, NewMessage,
    NewSession, PalaverError, PresenceState, Sender, ServerFrame, SessionField, SessionId,
    SessionStatus, is_typing_fresh,
};

use crate::freshness::FreshnessPolls;
use crate::registry::{PeerId, SessionRegistry};

const INVALID_SESSION_ID: &str = "Invalid session ID";
const NOT_JOINED: &str = "Not joined to a session";
const LOAD_FAILED: &str = "Failed to load messages";
const SEND_FAILED: &str = "Failed to send message";
const STATUS_FAILED: &str = "Failed to update status";
const STATUS_FORBIDDEN: &str = "Not allowed to change status";
const ONLINE_REQUIRED: &str = "online (boolean) is required";
const ADMIN_SENDER_FORBIDDEN: &str = "Not allowed to speak as admin";

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

/// Tunables for a [`Relay`].
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Period of the per-session freshness poll.
    pub freshness_poll: Duration,
    /// Outbound queue depth per peer.
    pub outbound_buffer: usize,
    /// Whether admin peers may toggle presence over the socket.
    pub allow_ws_status_change: bool,
    /// Only peers that presented the admin token may send as `admin`.
    /// Set whenever an admin token is configured.
    pub verify_admin_sender: bool,
    /// Presence served when the store cannot be read.
    pub presence_defaults: PresenceState,
}

impl RelayOptions {
    pub fn from_config(config: &PalaverConfig) -> Self {
        Self {
            freshness_poll: config.relay.freshness_poll(),
            outbound_buffer: config.relay.outbound_buffer,
            allow_ws_status_change: config.relay.allow_ws_status_change,
            verify_admin_sender: config.server.admin_token.is_some(),
            presence_defaults: PresenceState {
                online: false,
                welcome_message: config.presence.welcome_message.clone(),
                offline_message: config.presence.offline_message.clone(),
            },
        }
    }
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self::from_config(&PalaverConfig::default())
    }
}

/// A frame the relay refused. The text goes back as an `error` frame.
#[derive(Debug)]
struct Rejected(String);

impl Rejected {
    fn new(message: &str) -> Self {
        Rejected(message.to_string())
    }
}

impl From<PalaverError> for Rejected {
    fn from(e: PalaverError) -> Self {
        match e {
            PalaverError::Protocol(m)
            | PalaverError::Validation(m)
            | PalaverError::Unauthorized(m) => Rejected(m),
            other => Rejected(other.to_string()),
        }
    }
}

/// Shared relay state: registry, freshness polls and the store.
///
/// Cheap to clone; every clone drives the same registry.
#[derive(Clone)]
pub struct Relay {
    registry: Arc<SessionRegistry>,
    polls: FreshnessPolls,
    store: Arc<dyn ChatStore>,
    options: Arc<RelayOptions>,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("store", &self.store.name())
            .field("peers", &self.registry.peer_count())
            .field("sessions", &self.registry.session_count())
            .field("polls", &self.polls.len())
            .finish()
    }
}

impl Relay {
    pub fn new(store: Arc<dyn ChatStore>, options: RelayOptions) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            polls: FreshnessPolls::new(options.freshness_poll),
            store,
            options: Arc::new(options),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn polls(&self) -> &FreshnessPolls {
        &self.polls
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    pub fn options(&self) -> &RelayOptions {
        &self.options
    }

    /// Registers a new connection. Every peer starts in the global set so it
    /// receives presence broadcasts.
    pub fn open_peer(&self, admin: bool) -> (PeerId, mpsc::Receiver<String>) {
        let peer = PeerId::new();
        let (tx, rx) = mpsc::channel(self.options.outbound_buffer.max(1));
        self.registry.register(peer, tx, admin);
        self.registry.add_peer(peer);
        self.update_gauges();
        info!(peer = %peer, admin, "peer connected");
        (peer, rx)
    }

    /// Tears a connection down and stops the freshness poll of a session it
    /// leaves empty.
    pub fn close_peer(&self, peer: PeerId) {
        if let Some(session) = self.registry.unregister(peer) {
            self.polls.cancel_if_idle(session, &self.registry);
        }
        self.update_gauges();
        info!(peer = %peer, "peer disconnected");
    }

    /// Stops every freshness poll.
    pub fn shutdown(&self) {
        self.polls.cancel_all();
    }

    /// Handles one inbound text frame. Replies, if any, are queued on the
    /// peer's outbound channel.
    pub async fn handle_text(&self, peer: PeerId, text: &str) {
        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(peer = %peer, error = %e, "unparsable frame");
                self.reject(peer, e.into());
                return;
            }
        };
        let kind = frame.kind();
        palaver_prometheus::record_frame(kind);
        debug!(peer = %peer, kind, "inbound frame");

        let outcome = match frame {
            ClientFrame::Join { session_id } => self.on_join(peer, session_id.as_ref()).await,
            ClientFrame::Message {
                session_id,
                sender,
                message,
            } => {
                self.on_message(peer, session_id.as_ref(), sender.as_deref(), message.as_deref())
                    .await
            }
            ClientFrame::Typing {
                session_id,
                sender,
                is_typing,
            } => self.on_typing(peer, session_id.as_ref(), sender.as_deref(), is_typing),
            ClientFrame::SubscribeStatus => {
                self.on_subscribe_status(peer).await;
                Ok(())
            }
            ClientFrame::StatusChange { online } => self.on_status_change(peer, online).await,
        };

        if let Err(rejected) = outcome {
            debug!(peer = %peer, kind, reason = %rejected.0, "frame rejected");
            self.reject(peer, rejected);
        }
    }

    async fn on_join(&self, peer: PeerId, raw: Option<&Value>) -> Result<(), Rejected> {
        let session = raw
            .and_then(SessionId::from_json)
            .ok_or_else(|| Rejected::new(INVALID_SESSION_ID))?;

        let outcome = self.registry.join(peer, session);
        if let Some(left) = outcome.left.filter(|_| outcome.left_emptied) {
            self.polls.cancel_if_idle(left, &self.registry);
        }
        self.update_gauges();
        debug!(peer = %peer, session_id = %session, "peer joined session");

        let seen = match self.store.list_messages(session, None).await {
            Ok(messages) => {
                let count = messages.len();
                self.registry.set_last_message_count(peer, count);
                self.registry.send(peer, &ServerFrame::Messages { messages });
                count
            }
            Err(e) => {
                self.store_failed("list_messages", session, &e);
                self.reject(peer, Rejected::new(LOAD_FAILED));
                0
            }
        };

        self.polls
            .arm(session, seen, self.registry.clone(), self.store.clone());
        Ok(())
    }

    async fn on_message(
        &self,
        peer: PeerId,
        raw: Option<&Value>,
        sender: Option<&str>,
        body: Option<&str>,
    ) -> Result<(), Rejected> {
        let session = self.resolve_session(peer, raw)?;
        let sender = self.resolve_sender(peer, sender)?;
        self.publish_message(session, sender, body.unwrap_or_default())
            .await
            .map_err(|e| match e {
                PalaverError::Validation(_) => Rejected::from(e),
                _ => Rejected::new(SEND_FAILED),
            })?;
        Ok(())
    }

    fn on_typing(
        &self,
        peer: PeerId,
        raw: Option<&Value>,
        sender: Option<&str>,
        is_typing: bool,
    ) -> Result<(), Rejected> {
        let session = self.resolve_session(peer, raw)?;
        let sender = self.resolve_sender(peer, sender)?;
        self.registry.broadcast_session(
            session,
            &ServerFrame::Typing { sender, is_typing },
            Some(peer),
        );
        Ok(())
    }

    async fn on_subscribe_status(&self, peer: PeerId) {
        self.registry.add_peer(peer);
        let presence = self.presence().await;
        self.registry.send(
            peer,
            &ServerFrame::StatusChange {
                online: presence.online,
            },
        );
    }

    async fn on_status_change(&self, peer: PeerId, online: Option<bool>) -> Result<(), Rejected> {
        let admin = self.registry.peer(peer).is_some_and(|p| p.admin);
        if !self.options.allow_ws_status_change || !admin {
            return Err(Rejected::new(STATUS_FORBIDDEN));
        }
        let online = online.ok_or_else(|| Rejected::new(ONLINE_REQUIRED))?;
        self.set_presence(online, Some(peer))
            .await
            .map_err(|_| Rejected::new(STATUS_FAILED))
    }

    fn resolve_sender(&self, peer: PeerId, raw: Option<&str>) -> Result<Sender, Rejected> {
        let sender = Sender::from_wire(raw)?;
        if sender == Sender::Admin && self.options.verify_admin_sender {
            let admin = self.registry.peer(peer).is_some_and(|p| p.admin);
            if !admin {
                return Err(Rejected::new(ADMIN_SENDER_FORBIDDEN));
            }
        }
        Ok(sender)
    }

    /// The joined session wins over an explicit id in the frame.
    fn resolve_session(&self, peer: PeerId, raw: Option<&Value>) -> Result<SessionId, Rejected> {
        self.registry
            .joined_session(peer)
            .or_else(|| raw.and_then(SessionId::from_json))
            .ok_or_else(|| Rejected::new(NOT_JOINED))
    }

    fn reject(&self, peer: PeerId, rejected: Rejected) {
        self.registry.send(peer, &ServerFrame::error(rejected.0));
    }

    fn store_failed(&self, op: &'static str, session: SessionId, e: &PalaverError) {
        if e.class() == ErrorClass::Upstream {
            palaver_prometheus::record_store_error(op);
            warn!(session_id = %session, op, error = %e, "store call failed");
        } else {
            debug!(session_id = %session, op, error = %e, "store call refused");
        }
    }

    fn update_gauges(&self) {
        palaver_prometheus::set_connected_peers(self.registry.peer_count());
        palaver_prometheus::set_active_sessions(self.registry.session_count());
    }

    /// Persists a message, bumps the session's last-message time and fans
    /// it out to every member of the session, author included.
    pub async fn publish_message(
        &self,
        session: SessionId,
        sender: Sender,
        body: &str,
    ) -> Result<ChatMessage, PalaverError> {
        let new = NewMessage::new(session, sender, body)?;
        let message = self
            .store
            .create_message(new)
            .await
            .inspect_err(|e| self.store_failed("create_message", session, e))?;

        if let Err(e) = self
            .store
            .update_session_field(session, SessionField::LastMessageAt(message.created_at))
            .await
        {
            self.store_failed("update_session_field", session, &e);
        }

        let delivered = self.registry.broadcast_session(
            session,
            &ServerFrame::NewMessage {
                message: message.clone(),
            },
            None,
        );
        debug!(session_id = %session, message_id = %message.id, %sender, delivered, "message published");
        Ok(message)
    }

    /// Persists a typing assertion (`false` clears it) and tells the
    /// session's socket peers.
    pub async fn publish_typing(
        &self,
        session: SessionId,
        sender: Sender,
        is_typing: bool,
    ) -> Result<(), PalaverError> {
        let at = is_typing.then(Utc::now);
        self.store
            .update_session_field(session, SessionField::TypingAt { role: sender, at })
            .await
            .inspect_err(|e| self.store_failed("update_session_field", session, e))?;
        self.registry
            .broadcast_session(session, &ServerFrame::Typing { sender, is_typing }, None);
        Ok(())
    }

    /// Current presence, or the configured defaults (offline) when the store
    /// cannot be read.
    pub async fn presence(&self) -> PresenceState {
        match self.store.read_presence().await {
            Ok(presence) => presence,
            Err(e) => {
                palaver_prometheus::record_store_error("read_presence");
                warn!(error = %e, "presence unavailable, serving defaults");
                self.options.presence_defaults.clone()
            }
        }
    }

    /// Persists the operator flag and broadcasts it to every peer except
    /// `origin`.
    pub async fn set_presence(
        &self,
        online: bool,
        origin: Option<PeerId>,
    ) -> Result<(), PalaverError> {
        self.store.write_presence(online).await.inspect_err(|e| {
            palaver_prometheus::record_store_error("write_presence");
            warn!(online, error = %e, "failed to persist presence");
        })?;
        let delivered = self.registry.broadcast_status_change(online, origin);
        info!(online, delivered, "operator presence changed");
        Ok(())
    }

    /// Marks a session closed and notifies its peers.
    pub async fn close_session(&self, session: SessionId) -> Result<(), PalaverError> {
        self.store
            .update_session_field(session, SessionField::Status(SessionStatus::Closed))
            .await
            .inspect_err(|e| self.store_failed("update_session_field", session, e))?;
        let delivered = self.registry.broadcast_session_closed(session);
        info!(session_id = %session, delivered, "session closed");
        Ok(())
    }

    /// Presence plus, for a session, its status, the other party's typing
    /// flag and every message newer than `since`.
    ///
    /// Never fails: an unreadable session reports status `unknown`.
    pub async fn poll(&self, request: PollRequest) -> PollResponse {
        let mut response = PollResponse::from_presence(self.presence().await);
        let Some(session) = request.session_id else {
            return response;
        };
        let role = request.role.unwrap_or(Sender::Visitor);

        let read = async {
            let state = self.store.read_session(session).await?;
            let messages = self.store.list_messages(session, request.since).await?;
            Ok::<_, PalaverError>((state, messages))
        }
        .await;

        match read {
            Ok((state, messages)) => {
                response.session_status = Some(state.status.to_string());
                response.other_typing =
                    Some(is_typing_fresh(state.typing_at(role.other()), Utc::now()));
                response.messages = Some(messages);
            }
            Err(e) => {
                self.store_failed("poll", session, &e);
                response.session_status = Some("unknown".to_string());
                response.other_typing = Some(false);
                response.messages = Some(Vec::new());
            }
        }
        response
    }

    /// Opens a session for a visitor, with an optional first message.
    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<ChatSession, PalaverError> {
        let name = non_blank(request.name.as_deref());
        let email = non_blank(request.email.as_deref());
        let (Some(name), Some(email)) = (name, email) else {
            return Err(PalaverError::Validation(
                "Name and email are required".to_string(),
            ));
        };
        if !EMAIL.is_match(email) {
            return Err(PalaverError::Validation("Invalid email address".to_string()));
        }

        let session = self
            .store
            .create_session(NewSession {
                visitor_name: name.to_string(),
                visitor_email: email.to_string(),
                visitor_phone: non_blank(request.phone.as_deref()).map(str::to_string),
            })
            .await
            .inspect_err(|e| {
                palaver_prometheus::record_store_error("create_session");
                warn!(error = %e, "failed to create session");
            })?;
        info!(session_id = %session.id, "session created");

        if let Some(first) = non_blank(request.message.as_deref()) {
            self.publish_message(session.id, Sender::Visitor, first)
                .await?;
        }
        Ok(session)
    }

    /// Whether a stored session can still be chatted in.
    pub async fn session_validity(
        &self,
        session: SessionId,
    ) -> Result<SessionValidity, PalaverError> {
        let state = self
            .store
            .read_session(session)
            .await
            .inspect_err(|e| self.store_failed("read_session", session, e))?;
        Ok(SessionValidity {
            valid: state.status == SessionStatus::Active,
            session_id: state.id,
            status: state.status.to_string(),
        })
    }

    /// The full ordered history of a session.
    pub async fn history(&self, session: SessionId) -> Result<Vec<ChatMessage>, PalaverError> {
        self.store
            .list_messages(session, None)
            .await
            .inspect_err(|e| self.store_failed("list_messages", session, e))
    }

    /// Store health as seen by the relay.
    pub async fn store_health(&self) -> HealthStatus {
        match self.store.health_check().await {
            Ok(status) => status,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
