// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The realtime bridge.
//!
//! A [`BridgeClient`] is a cheap handle onto a single driver task that owns
//! the live transport, the polling fallback, the typing timers and the local
//! message list. Handles talk to the driver over a command channel; the
//! driver publishes [`BridgeEvent`]s on a broadcast channel and the current
//! [`BridgeSnapshot`] on a watch channel.
//!
//! Modes: `disconnected -> connecting -> connected`, or `connecting ->
//! polling` when the handshake fails. An unexpected close while connected
//! schedules reconnects on a capped exponential backoff; once the attempt
//! cap is spent the bridge polls until the next explicit connect.
//! [`BridgeClient::disconnect`] is terminal and cancels every timer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use palaver_config::{ClientConfig, PalaverConfig, TransportKind};
use palaver_core::protocol::{PollRequest, PollResponse};
use palaver_core::{ChatMessage, NewMessage, PalaverError, Sender, SessionId};

use crate::backoff::Backoff;
use crate::debounce::TypingDebouncer;
use crate::observer::TypingObserver;
use crate::poller::{HttpPoller, PollApi};
use crate::state::MessageState;
use crate::transport::{CmsConnector, Connector, RelayConnector, Transport, TransportEvent};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

/// Where the bridge currently gets its updates from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionMode {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Polling,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionMode::Disconnected => "disconnected",
            ConnectionMode::Connecting => "connecting",
            ConnectionMode::Connected => "connected",
            ConnectionMode::Polling => "polling",
        })
    }
}

/// Something callers may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// A message not seen before in the current session.
    NewMessage(ChatMessage),
    /// Operator presence flipped.
    StatusChange(bool),
    /// The current session was closed by an operator. Sent once per session.
    SessionClosed(SessionId),
    /// The other party started or stopped typing.
    TypingChanged(bool),
    ModeChanged(ConnectionMode),
    /// The live transport refused something this client sent, such as a
    /// message the relay could not store.
    Rejected(String),
}

/// Current bridge state, as published on the watch channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeSnapshot {
    pub mode: ConnectionMode,
    pub session: Option<SessionId>,
    /// `None` until presence has been observed once.
    pub online: Option<bool>,
    pub other_typing: bool,
    /// De-duplicated, ordered by `(created_at, id)`.
    pub messages: Vec<ChatMessage>,
}

/// Timing and identity of a bridge.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Which side of the conversation this client speaks for.
    pub role: Sender,
    pub handshake_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub reconnect_max_attempts: u32,
    pub session_poll: Duration,
    pub presence_poll: Duration,
    pub typing_debounce: Duration,
    pub typing_freshness: Duration,
}

impl BridgeOptions {
    pub fn from_config(config: &ClientConfig, role: Sender) -> Self {
        Self {
            role,
            handshake_timeout: config.handshake_timeout(),
            reconnect_base: config.reconnect_base(),
            reconnect_max: config.reconnect_max(),
            reconnect_max_attempts: config.reconnect_max_attempts,
            session_poll: config.session_poll(),
            presence_poll: config.presence_poll(),
            typing_debounce: config.typing_debounce(),
            typing_freshness: config.typing_freshness(),
        }
    }
}

enum Command {
    Connect {
        fallback: bool,
        reply: oneshot::Sender<Result<ConnectionMode, PalaverError>>,
    },
    Join {
        session: SessionId,
        reply: oneshot::Sender<()>,
    },
    Leave {
        reply: oneshot::Sender<()>,
    },
    Send {
        body: String,
        reply: oneshot::Sender<Result<(), PalaverError>>,
    },
    Keystroke,
    StopTyping,
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Handle onto a running bridge. Clones share the same driver; the driver
/// stops when the last handle is dropped.
#[derive(Clone)]
pub struct BridgeClient {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<BridgeEvent>,
    snapshot: watch::Receiver<BridgeSnapshot>,
}

impl fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeClient")
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl BridgeClient {
    /// Spawns the driver. Must be called from within a tokio runtime.
    pub fn new(
        connector: Arc<dyn Connector>,
        poller: Arc<dyn PollApi>,
        options: BridgeOptions,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(BridgeSnapshot::default());

        let driver = Driver {
            backoff: Backoff::new(
                options.reconnect_base,
                options.reconnect_max,
                options.reconnect_max_attempts,
            ),
            debouncer: TypingDebouncer::new(options.typing_debounce),
            observer: TypingObserver::new(options.typing_freshness),
            connector,
            poller,
            options,
            commands: commands_rx,
            events: events.clone(),
            snapshot: snapshot_tx,
            mode: ConnectionMode::Disconnected,
            transport: None,
            session: None,
            state: MessageState::new(),
            poll_cursor: None,
            online: None,
            closed_notified: false,
            reconnect_at: None,
            next_poll: None,
        };
        tokio::spawn(driver.run());

        Self {
            commands: commands_tx,
            events,
            snapshot: snapshot_rx,
        }
    }

    /// Builds the configured transport and poller for `role`.
    ///
    /// Admin clients of the relay transport present `server.admin_token`.
    pub fn from_config(config: &PalaverConfig, role: Sender) -> Result<Self, PalaverError> {
        let client = &config.client;
        let connector: Arc<dyn Connector> = match client.transport {
            TransportKind::Relay => {
                let token = match role {
                    Sender::Admin => config.server.admin_token.clone(),
                    Sender::Visitor => None,
                };
                Arc::new(RelayConnector::new(client.relay_url.clone(), token))
            }
            TransportKind::Cms => {
                let url = client.cms_realtime_url.clone().ok_or_else(|| {
                    PalaverError::Config(
                        "client.cms_realtime_url is required for the cms transport".to_string(),
                    )
                })?;
                Arc::new(CmsConnector::new(
                    url,
                    client.token_url.clone(),
                    config.store.request_timeout(),
                )?)
            }
        };
        let poller = Arc::new(HttpPoller::new(
            &client.http_url,
            config.store.request_timeout(),
        )?);
        Ok(Self::new(
            connector,
            poller,
            BridgeOptions::from_config(client, role),
        ))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, PalaverError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| driver_gone())?;
        rx.await.map_err(|_| driver_gone())
    }

    /// Connects the live transport, falling back to polling if the handshake
    /// fails or times out. Also resets the reconnect attempt counter.
    pub async fn connect(&self) -> Result<ConnectionMode, PalaverError> {
        self.request(|reply| Command::Connect {
            fallback: true,
            reply,
        })
        .await?
    }

    /// Like [`BridgeClient::connect`] but returns the handshake error and
    /// stays disconnected, leaving the fallback policy to the caller.
    pub async fn try_connect(&self) -> Result<ConnectionMode, PalaverError> {
        self.request(|reply| Command::Connect {
            fallback: false,
            reply,
        })
        .await?
    }

    /// Binds the bridge to `session`, dropping local state of any previous one.
    pub async fn join_session(&self, session: SessionId) -> Result<(), PalaverError> {
        self.request(|reply| Command::Join { session, reply }).await
    }

    pub async fn leave_session(&self) -> Result<(), PalaverError> {
        self.request(|reply| Command::Leave { reply }).await
    }

    /// Sends a message to the joined session. Blank bodies are rejected.
    pub async fn send_message(&self, body: &str) -> Result<(), PalaverError> {
        let body = body.to_string();
        self.request(|reply| Command::Send { body, reply }).await?
    }

    /// Reports a keystroke in the input box.
    pub async fn keystroke(&self) -> Result<(), PalaverError> {
        self.commands
            .send(Command::Keystroke)
            .await
            .map_err(|_| driver_gone())
    }

    /// Input cleared or submitted: `typing(false)` goes out immediately.
    pub async fn stop_typing(&self) -> Result<(), PalaverError> {
        self.commands
            .send(Command::StopTyping)
            .await
            .map_err(|_| driver_gone())
    }

    /// Closes the transport and stops polling and reconnecting.
    pub async fn disconnect(&self) -> Result<(), PalaverError> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<BridgeSnapshot> {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> BridgeSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn mode(&self) -> ConnectionMode {
        self.snapshot.borrow().mode
    }
}

fn driver_gone() -> PalaverError {
    PalaverError::Internal("bridge driver stopped".to_string())
}

fn not_connected() -> PalaverError {
    PalaverError::Transport {
        message: "bridge is not connected".to_string(),
        source: None,
    }
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn next_event(transport: &mut Option<Box<dyn Transport>>) -> Option<TransportEvent> {
    match transport {
        Some(transport) => transport.next_event().await,
        None => std::future::pending().await,
    }
}

struct Driver {
    connector: Arc<dyn Connector>,
    poller: Arc<dyn PollApi>,
    options: BridgeOptions,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<BridgeEvent>,
    snapshot: watch::Sender<BridgeSnapshot>,

    mode: ConnectionMode,
    transport: Option<Box<dyn Transport>>,
    session: Option<SessionId>,
    state: MessageState,
    /// Newest `created_at` returned by a poll; only poll responses move it.
    poll_cursor: Option<DateTime<Utc>>,
    online: Option<bool>,
    closed_notified: bool,

    backoff: Backoff,
    reconnect_at: Option<Instant>,
    next_poll: Option<Instant>,
    debouncer: TypingDebouncer,
    observer: TypingObserver,
}

impl Driver {
    async fn run(mut self) {
        loop {
            let reconnect_at = self.reconnect_at;
            let next_poll = self.next_poll;
            let typing_quiet_at = self.debouncer.deadline();
            let typing_clear_at = self.observer.deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                event = next_event(&mut self.transport) => match event {
                    Some(event) => self.on_event(event),
                    None => self.on_transport_lost().await,
                },
                () = wait_until(reconnect_at) => self.reconnect().await,
                () = wait_until(next_poll) => self.poll().await,
                () = wait_until(typing_quiet_at) => {
                    if self.debouncer.expire(Instant::now()) {
                        self.send_typing(false).await;
                    }
                }
                () = wait_until(typing_clear_at) => {
                    if let Some(typing) = self.observer.expire(Instant::now()) {
                        self.emit(BridgeEvent::TypingChanged(typing));
                    }
                }
            }
            self.publish();
        }

        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        debug!("bridge driver stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Connect { fallback, reply } => {
                let result = self.connect(fallback).await;
                let _ = reply.send(result);
            }
            Command::Join { session, reply } => {
                self.join(Some(session)).await;
                let _ = reply.send(());
            }
            Command::Leave { reply } => {
                self.join(None).await;
                let _ = reply.send(());
            }
            Command::Send { body, reply } => {
                let result = self.send_message(&body).await;
                let _ = reply.send(result);
            }
            Command::Keystroke => {
                if self.session.is_some()
                    && self.mode != ConnectionMode::Disconnected
                    && self.debouncer.keystroke(Instant::now())
                {
                    self.send_typing(true).await;
                }
            }
            Command::StopTyping => {
                if self.session.is_some() {
                    self.debouncer.stop();
                    self.send_typing(false).await;
                }
            }
            Command::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(());
            }
        }
    }

    async fn connect(&mut self, fallback: bool) -> Result<ConnectionMode, PalaverError> {
        if self.mode == ConnectionMode::Connected {
            return Ok(self.mode);
        }
        self.reconnect_at = None;
        self.next_poll = None;
        self.backoff.reset();
        self.set_mode(ConnectionMode::Connecting);

        match self.open_live().await {
            Ok(()) => {
                self.set_mode(ConnectionMode::Connected);
                Ok(self.mode)
            }
            Err(e) if fallback => {
                warn!(
                    transport = self.connector.name(),
                    error = %e,
                    "live transport unavailable, falling back to polling"
                );
                self.start_polling();
                Ok(self.mode)
            }
            Err(e) => {
                self.set_mode(ConnectionMode::Disconnected);
                Err(e)
            }
        }
    }

    /// Opens the transport within the handshake timeout and re-subscribes.
    async fn open_live(&mut self) -> Result<(), PalaverError> {
        let timeout = self.options.handshake_timeout;
        let mut transport = tokio::time::timeout(timeout, self.connector.connect())
            .await
            .map_err(|_| PalaverError::Timeout { duration: timeout })??;

        let subscribed = match transport.subscribe_presence().await {
            Ok(()) => match self.session {
                Some(session) => transport.join(session).await,
                None => Ok(()),
            },
            Err(e) => Err(e),
        };
        if let Err(e) = subscribed {
            transport.close().await;
            return Err(e);
        }

        self.transport = Some(transport);
        self.backoff.reset();
        info!(transport = self.connector.name(), "bridge connected");
        Ok(())
    }

    async fn on_transport_lost(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        if self.mode == ConnectionMode::Connected {
            info!(transport = self.connector.name(), "live transport closed");
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        match self.backoff.next_delay() {
            Some(delay) => {
                debug!(attempt = self.backoff.attempts(), ?delay, "scheduling reconnect");
                self.reconnect_at = Some(Instant::now() + delay);
                self.set_mode(ConnectionMode::Connecting);
            }
            None => {
                warn!(
                    attempts = self.backoff.attempts(),
                    "reconnect attempts exhausted, switching to polling"
                );
                self.reconnect_at = None;
                self.start_polling();
            }
        }
    }

    async fn reconnect(&mut self) {
        self.reconnect_at = None;
        match self.open_live().await {
            Ok(()) => self.set_mode(ConnectionMode::Connected),
            Err(e) => {
                debug!(error = %e, "reconnect failed");
                self.schedule_reconnect();
            }
        }
    }

    async fn disconnect(&mut self) {
        self.reconnect_at = None;
        self.next_poll = None;
        self.debouncer.stop();
        self.observer.reset();
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        self.set_mode(ConnectionMode::Disconnected);
    }

    async fn join(&mut self, session: Option<SessionId>) {
        self.session = session;
        self.state.clear();
        self.poll_cursor = None;
        self.observer.reset();
        self.debouncer.stop();
        self.closed_notified = false;

        match self.mode {
            ConnectionMode::Connected => {
                let joined = match (self.transport.as_mut(), session) {
                    (Some(transport), Some(session)) => transport.join(session).await,
                    (Some(transport), None) => transport.subscribe_presence().await,
                    (None, _) => Ok(()),
                };
                if let Err(e) = joined {
                    debug!(error = %e, "join failed on live transport");
                    self.on_transport_lost().await;
                }
            }
            ConnectionMode::Polling => self.start_polling(),
            ConnectionMode::Connecting | ConnectionMode::Disconnected => {}
        }
    }

    async fn send_message(&mut self, body: &str) -> Result<(), PalaverError> {
        let session = self
            .session
            .ok_or_else(|| PalaverError::Validation("Not joined to a session".to_string()))?;
        let message = NewMessage::new(session, self.options.role, body)?;
        if self.debouncer.is_active() {
            self.debouncer.stop();
            self.send_typing(false).await;
        }

        if self.mode == ConnectionMode::Connected {
            let sent = match self.transport.as_mut() {
                Some(transport) => {
                    transport
                        .send_message(session, message.sender, &message.body)
                        .await
                }
                None => Err(not_connected()),
            };
            match sent {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(error = %e, "live send failed, retrying over HTTP");
                    self.on_transport_lost().await;
                }
            }
        }
        if self.mode == ConnectionMode::Disconnected {
            return Err(not_connected());
        }

        let stored = self
            .poller
            .send_message(session, message.sender, &message.body)
            .await?;
        if self.state.insert(stored.clone()) {
            self.emit(BridgeEvent::NewMessage(stored));
        }
        Ok(())
    }

    /// Best effort: typing failures never reach the caller.
    async fn send_typing(&mut self, is_typing: bool) {
        let Some(session) = self.session else {
            return;
        };
        let role = self.options.role;
        let result = match (self.mode, self.transport.as_mut()) {
            (ConnectionMode::Connected, Some(transport)) => {
                transport.send_typing(session, role, is_typing).await
            }
            (ConnectionMode::Disconnected, _) => return,
            _ => self.poller.send_typing(session, role, is_typing).await,
        };
        if let Err(e) = result {
            debug!(error = %e, is_typing, "typing update dropped");
        }
    }

    fn start_polling(&mut self) {
        self.set_mode(ConnectionMode::Polling);
        self.next_poll = Some(Instant::now());
    }

    async fn poll(&mut self) {
        let interval = if self.session.is_some() {
            self.options.session_poll
        } else {
            self.options.presence_poll
        };
        self.next_poll = Some(Instant::now() + interval);

        let request = PollRequest {
            session_id: self.session,
            since: self.session.and(self.poll_cursor),
            role: Some(self.options.role),
        };
        match self.poller.poll(&request).await {
            Ok(response) => self.apply_poll(response),
            Err(e) => debug!(error = %e, "poll failed, retrying next tick"),
        }
    }

    fn apply_poll(&mut self, response: PollResponse) {
        self.set_online(response.online);
        if self.session.is_none() {
            return;
        }
        if let Some(typing) = response.other_typing {
            if let Some(changed) = self.observer.observe_flag(typing, Instant::now()) {
                self.emit(BridgeEvent::TypingChanged(changed));
            }
        }
        if response.session_status.as_deref() == Some("closed") {
            self.notify_closed();
        }
        if let Some(messages) = response.messages {
            let newest = messages.iter().map(|m| m.created_at).max();
            self.poll_cursor = self.poll_cursor.max(newest);
            for message in self.state.merge(messages) {
                self.emit(BridgeEvent::NewMessage(message));
            }
        }
    }

    fn on_event(&mut self, event: TransportEvent) {
        let other = self.options.role.other();
        let joined = self.session.is_some();
        match event {
            TransportEvent::Snapshot(messages) => {
                if self.session.is_some() {
                    for message in self.state.merge(messages) {
                        self.emit(BridgeEvent::NewMessage(message));
                    }
                }
            }
            TransportEvent::Message(message) => {
                let ours = self.session.is_some()
                    && message.session.is_none_or(|s| Some(s) == self.session);
                if ours && self.state.insert(message.clone()) {
                    self.emit(BridgeEvent::NewMessage(message));
                }
            }
            TransportEvent::Typing { sender, is_typing } if sender == other && joined => {
                if let Some(changed) = self.observer.observe_flag(is_typing, Instant::now()) {
                    self.emit(BridgeEvent::TypingChanged(changed));
                }
            }
            TransportEvent::TypingAt { sender, at } if sender == other && joined => {
                let changed = self
                    .observer
                    .observe_timestamp(at, Utc::now(), Instant::now());
                if let Some(changed) = changed {
                    self.emit(BridgeEvent::TypingChanged(changed));
                }
            }
            TransportEvent::Typing { .. } | TransportEvent::TypingAt { .. } => {}
            TransportEvent::Presence(online) => self.set_online(online),
            TransportEvent::SessionClosed(session) => {
                if Some(session) == self.session {
                    self.notify_closed();
                }
            }
            TransportEvent::Rejected(reason) => {
                warn!(transport = self.connector.name(), %reason, "request rejected");
                self.emit(BridgeEvent::Rejected(reason));
            }
        }
    }

    fn set_online(&mut self, online: bool) {
        let previous = self.online.replace(online);
        if previous.is_some_and(|p| p != online) {
            self.emit(BridgeEvent::StatusChange(online));
        }
    }

    fn notify_closed(&mut self) {
        if self.closed_notified {
            return;
        }
        if let Some(session) = self.session {
            self.closed_notified = true;
            self.emit(BridgeEvent::SessionClosed(session));
        }
    }

    fn set_mode(&mut self, mode: ConnectionMode) {
        if self.mode != mode {
            info!(from = %self.mode, to = %mode, "bridge mode changed");
            self.mode = mode;
            self.emit(BridgeEvent::ModeChanged(mode));
        }
    }

    fn emit(&self, event: BridgeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        let next = BridgeSnapshot {
            mode: self.mode,
            session: self.session,
            online: self.online,
            other_typing: self.observer.is_typing(),
            messages: self.state.messages().to_vec(),
        };
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
