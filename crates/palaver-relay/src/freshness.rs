// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session freshness polls.
//!
//! While a session has joined peers, one background task per session
//! re-reads the message list and re-broadcasts a full snapshot whenever the
//! count grows. This catches messages written by paths that bypass the relay.
//! At most one poll runs per session; it stops as soon as the session has no
//! peers, either when cancelled by the last leaver or on its own next tick.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use palaver_core::{ChatStore, ServerFrame, SessionId};

use crate::registry::SessionRegistry;

#[derive(Debug)]
struct PollHandle {
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct Polls {
    running: HashMap<SessionId, PollHandle>,
    next_generation: u64,
}

/// Owner of all running freshness polls.
#[derive(Debug, Clone)]
pub struct FreshnessPolls {
    polls: Arc<Mutex<Polls>>,
    period: Duration,
}

impl FreshnessPolls {
    /// Polls that tick every `period`.
    pub fn new(period: Duration) -> Self {
        Self {
            polls: Arc::new(Mutex::new(Polls::default())),
            period,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Polls> {
        self.polls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a poll is running for `session`.
    pub fn is_running(&self, session: SessionId) -> bool {
        self.lock().running.contains_key(&session)
    }

    /// Number of running polls.
    pub fn len(&self) -> usize {
        self.lock().running.len()
    }

    /// Whether no poll is running.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts the poll for `session` unless one is already running.
    ///
    /// `seen` is the message count the joining peer was just sent, so the
    /// first tick only broadcasts if something arrived since.
    pub fn arm(
        &self,
        session: SessionId,
        seen: usize,
        registry: Arc<SessionRegistry>,
        store: Arc<dyn ChatStore>,
    ) -> bool {
        let mut polls = self.lock();
        if polls.running.contains_key(&session) {
            return false;
        }
        let generation = polls.next_generation;
        polls.next_generation += 1;
        let token = CancellationToken::new();
        polls.running.insert(
            session,
            PollHandle {
                generation,
                token: token.clone(),
            },
        );
        palaver_prometheus::set_freshness_polls(polls.running.len());
        drop(polls);

        debug!(session_id = %session, "freshness poll armed");
        tokio::spawn(run_poll(
            self.clone(),
            session,
            generation,
            seen,
            token,
            registry,
            store,
        ));
        true
    }

    /// Cancels the poll for `session` if the session has no peers.
    ///
    /// The peer check happens under the poll lock so a concurrent join that
    /// found the poll still running is never left without one.
    pub fn cancel_if_idle(&self, session: SessionId, registry: &SessionRegistry) -> bool {
        let mut polls = self.lock();
        if registry.has_peers(session) {
            return false;
        }
        let Some(handle) = polls.running.remove(&session) else {
            return false;
        };
        handle.token.cancel();
        palaver_prometheus::set_freshness_polls(polls.running.len());
        debug!(session_id = %session, "freshness poll cancelled");
        true
    }

    /// Cancels every poll.
    pub fn cancel_all(&self) {
        let mut polls = self.lock();
        for (_, handle) in polls.running.drain() {
            handle.token.cancel();
        }
        palaver_prometheus::set_freshness_polls(0);
    }

    /// Called by a poll on each tick: removes it and returns `true` if its
    /// session has no peers left.
    fn retire_if_idle(
        &self,
        session: SessionId,
        generation: u64,
        registry: &SessionRegistry,
    ) -> bool {
        let mut polls = self.lock();
        if registry.has_peers(session) {
            return false;
        }
        if polls
            .running
            .get(&session)
            .is_some_and(|h| h.generation == generation)
        {
            polls.running.remove(&session);
            palaver_prometheus::set_freshness_polls(polls.running.len());
        }
        true
    }
}

async fn run_poll(
    polls: FreshnessPolls,
    session: SessionId,
    generation: u64,
    mut seen: usize,
    token: CancellationToken,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn ChatStore>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + polls.period, polls.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if polls.retire_if_idle(session, generation, &registry) {
            debug!(session_id = %session, "freshness poll stopped: no peers");
            break;
        }

        let listed = tokio::select! {
            _ = token.cancelled() => break,
            listed = store.list_messages(session, None) => listed,
        };

        match listed {
            Ok(messages) if messages.len() > seen => {
                seen = messages.len();
                debug!(session_id = %session, count = seen, "freshness poll found new messages");
                registry.broadcast_session(session, &ServerFrame::Messages { messages }, None);
            }
            Ok(_) => {}
            Err(e) => {
                palaver_prometheus::record_store_error("list_messages");
                warn!(session_id = %session, error = %e, "freshness poll failed to list messages");
            }
        }
    }
}
