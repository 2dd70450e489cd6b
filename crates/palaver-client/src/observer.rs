// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Receiver-side "is the other party typing" flag.
//!
//! Fed either by explicit typing frames or by typing timestamps read off
//! session item diffs. A positive observation arms a clear deadline one
//! freshness window later so the flag drops even if no "stopped" arrives.

use std::time::Duration;

use chrono::{DateTime, Utc};
use palaver_core::typing::is_fresh_within;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct TypingObserver {
    freshness: Duration,
    typing: bool,
    clear_at: Option<Instant>,
}

impl TypingObserver {
    pub fn new(freshness: Duration) -> Self {
        Self {
            freshness,
            typing: false,
            clear_at: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.clear_at
    }

    /// An explicit typing flag. Returns the new value if it changed.
    pub fn observe_flag(&mut self, typing: bool, now: Instant) -> Option<bool> {
        self.clear_at = typing.then(|| now + self.freshness);
        self.set(typing)
    }

    /// A typing timestamp from a session diff. `None` means cleared.
    pub fn observe_timestamp(
        &mut self,
        at: Option<DateTime<Utc>>,
        wall_now: DateTime<Utc>,
        now: Instant,
    ) -> Option<bool> {
        let typing = is_fresh_within(at, wall_now, self.freshness);
        self.observe_flag(typing, now)
    }

    /// Drops the flag once the clear deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Option<bool> {
        match self.clear_at {
            Some(at) if now >= at => {
                self.clear_at = None;
                self.set(false)
            }
            _ => None,
        }
    }

    /// Forgets everything without reporting a change.
    pub fn reset(&mut self) {
        self.typing = false;
        self.clear_at = None;
    }

    fn set(&mut self, typing: bool) -> Option<bool> {
        if self.typing == typing {
            return None;
        }
        self.typing = typing;
        Some(typing)
    }
}
