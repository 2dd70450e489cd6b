// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session registry: who is connected, who joined which session, and how to
//! reach them.
//!
//! Membership lives behind one mutex so the peer -> session and
//! session -> peers indexes always agree. Outbound queues live in a separate
//! map so fan-out never holds the membership lock while writing.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use palaver_core::{ServerFrame, SessionId};

/// Identity of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(uuid::Uuid);

impl PeerId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Relay-side state of one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionPeer {
    /// Session joined, if any.
    pub session: Option<SessionId>,
    /// Message count seen in the last snapshot sent to this peer.
    pub last_message_count: usize,
    /// Whether the connection presented the admin credential.
    pub admin: bool,
}

#[derive(Debug, Default)]
struct Membership {
    peers: HashMap<PeerId, ConnectionPeer>,
    global: HashSet<PeerId>,
    sessions: HashMap<SessionId, HashSet<PeerId>>,
}

impl Membership {
    /// Removes `peer` from `session`'s set, dropping the set when it empties.
    /// Returns `true` if the set was dropped.
    fn detach(&mut self, peer: PeerId, session: SessionId) -> bool {
        let Some(set) = self.sessions.get_mut(&session) else {
            return false;
        };
        set.remove(&peer);
        if set.is_empty() {
            self.sessions.remove(&session);
            true
        } else {
            false
        }
    }
}

/// Outcome of a [`SessionRegistry::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// The session the peer was in before, if it was a different one.
    pub left: Option<SessionId>,
    /// Whether the previous session lost its last peer.
    pub left_emptied: bool,
}

/// Process-local registry of peers and session membership.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    membership: Mutex<Membership>,
    outbound: DashMap<PeerId, mpsc::Sender<String>>,
}

impl SessionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Membership> {
        // Membership updates never panic midway, so a poisoned lock still
        // holds consistent data.
        self.membership
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new connection and its outbound queue.
    pub fn register(&self, peer: PeerId, outbound: mpsc::Sender<String>, admin: bool) {
        self.lock().peers.insert(
            peer,
            ConnectionPeer {
                admin,
                ..ConnectionPeer::default()
            },
        );
        self.outbound.insert(peer, outbound);
    }

    /// Removes a connection from every set. Returns the session it was in
    /// if that session lost its last peer.
    pub fn unregister(&self, peer: PeerId) -> Option<SessionId> {
        self.outbound.remove(&peer);
        let mut m = self.lock();
        m.global.remove(&peer);
        let state = m.peers.remove(&peer)?;
        let session = state.session?;
        m.detach(peer, session).then_some(session)
    }

    /// Adds a peer to the global set used for presence broadcasts.
    pub fn add_peer(&self, peer: PeerId) {
        self.lock().global.insert(peer);
    }

    /// Removes a peer from the global set.
    pub fn remove_peer(&self, peer: PeerId) {
        self.lock().global.remove(&peer);
    }

    /// Moves a peer into `session`, leaving its previous session first.
    pub fn join(&self, peer: PeerId, session: SessionId) -> JoinOutcome {
        let mut m = self.lock();
        let previous = m.peers.entry(peer).or_default().session.replace(session);
        let mut outcome = JoinOutcome {
            left: None,
            left_emptied: false,
        };
        if let Some(prev) = previous.filter(|p| *p != session) {
            outcome.left = Some(prev);
            outcome.left_emptied = m.detach(peer, prev);
        }
        m.sessions.entry(session).or_default().insert(peer);
        outcome
    }

    /// [`SessionRegistry::join`] for callers that do not need the outcome.
    pub fn add_peer_to_session(&self, session: SessionId, peer: PeerId) {
        self.join(peer, session);
    }

    /// Removes a peer from a session's set. Returns `true` if the set emptied.
    pub fn remove_peer_from_session(&self, session: SessionId, peer: PeerId) -> bool {
        let mut m = self.lock();
        if let Some(state) = m.peers.get_mut(&peer) {
            if state.session == Some(session) {
                state.session = None;
            }
        }
        m.detach(peer, session)
    }

    /// Snapshot of a session's members; empty for unknown sessions.
    pub fn peers_for_session(&self, session: SessionId) -> HashSet<PeerId> {
        self.lock()
            .sessions
            .get(&session)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether any peer is joined to `session`.
    pub fn has_peers(&self, session: SessionId) -> bool {
        self.lock()
            .sessions
            .get(&session)
            .is_some_and(|set| !set.is_empty())
    }

    /// The session a peer has joined.
    pub fn joined_session(&self, peer: PeerId) -> Option<SessionId> {
        self.lock().peers.get(&peer).and_then(|p| p.session)
    }

    /// A copy of the peer's state.
    pub fn peer(&self, peer: PeerId) -> Option<ConnectionPeer> {
        self.lock().peers.get(&peer).cloned()
    }

    /// Records the message count last sent to a peer.
    pub fn set_last_message_count(&self, peer: PeerId, count: usize) {
        if let Some(state) = self.lock().peers.get_mut(&peer) {
            state.last_message_count = count;
        }
    }

    /// Number of registered connections.
    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }

    /// Number of sessions with at least one member.
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Queues a frame for one peer. Returns `false` if it was dropped.
    pub fn send(&self, peer: PeerId, frame: &ServerFrame) -> bool {
        match frame.encode() {
            Ok(text) => self.send_text(peer, text),
            Err(e) => {
                warn!(error = %e, "dropping unencodable frame");
                false
            }
        }
    }

    fn send_text(&self, peer: PeerId, text: String) -> bool {
        let Some(tx) = self.outbound.get(&peer).map(|tx| tx.clone()) else {
            return false;
        };
        match tx.try_send(text) {
            Ok(()) => true,
            Err(e) => {
                debug!(peer = %peer, error = %e, "outbound queue rejected frame");
                false
            }
        }
    }

    fn fan_out<I>(&self, targets: I, frame: &ServerFrame) -> usize
    where
        I: IntoIterator<Item = PeerId>,
    {
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "dropping unencodable frame");
                return 0;
            }
        };
        let delivered = targets
            .into_iter()
            .filter(|peer| self.send_text(*peer, text.clone()))
            .count();
        palaver_prometheus::record_fanout(frame.kind(), delivered);
        delivered
    }

    /// Sends to every member of `session` except `exclude`. Returns the
    /// number of peers the frame was queued for.
    pub fn broadcast_session(
        &self,
        session: SessionId,
        frame: &ServerFrame,
        exclude: Option<PeerId>,
    ) -> usize {
        let targets = self
            .peers_for_session(session)
            .into_iter()
            .filter(|p| Some(*p) != exclude);
        self.fan_out(targets, frame)
    }

    /// Sends `status_change` to every peer in the global set except `exclude`.
    pub fn broadcast_status_change(&self, online: bool, exclude: Option<PeerId>) -> usize {
        let targets: Vec<PeerId> = self
            .lock()
            .global
            .iter()
            .copied()
            .filter(|p| Some(*p) != exclude)
            .collect();
        self.fan_out(targets, &ServerFrame::StatusChange { online })
    }

    /// Sends `session_closed` to every member of `session`.
    pub fn broadcast_session_closed(&self, session: SessionId) -> usize {
        self.broadcast_session(
            session,
            &ServerFrame::SessionClosed {
                session_id: session,
            },
            None,
        )
    }
}
