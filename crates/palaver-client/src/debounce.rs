// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sender-side typing debounce.
//!
//! The first keystroke after a quiet period emits `typing(true)`; further
//! keystrokes only push the trailing deadline out. When the deadline passes
//! without another keystroke, `typing(false)` is emitted. The caller owns the
//! timer: it sleeps until [`TypingDebouncer::deadline`] and then calls
//! [`TypingDebouncer::expire`].

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl TypingDebouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// Records a keystroke. Returns `true` when `typing(true)` must be sent.
    pub fn keystroke(&mut self, now: Instant) -> bool {
        let started = self.deadline.is_none();
        self.deadline = Some(now + self.quiet);
        started
    }

    /// Returns `true` when the trailing deadline has passed and
    /// `typing(false)` must be sent.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Explicit stop: clears any pending deadline. The caller always sends
    /// `typing(false)` afterwards.
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(1200);

    #[test]
    fn burst_of_keystrokes_sends_true_once() {
        let start = Instant::now();
        let mut debouncer = TypingDebouncer::new(QUIET);
        assert!(debouncer.keystroke(start));
        for i in 1..20 {
            assert!(!debouncer.keystroke(start + Duration::from_millis(100 * i)));
        }
    }

    #[test]
    fn each_keystroke_pushes_deadline() {
        let start = Instant::now();
        let mut debouncer = TypingDebouncer::new(QUIET);
        debouncer.keystroke(start);
        debouncer.keystroke(start + Duration::from_millis(1000));
        assert!(!debouncer.expire(start + QUIET));
        assert_eq!(
            debouncer.deadline(),
            Some(start + Duration::from_millis(1000) + QUIET)
        );
        assert!(debouncer.expire(start + Duration::from_millis(2200)));
        assert!(!debouncer.is_active());
    }

    #[test]
    fn expire_fires_once() {
        let start = Instant::now();
        let mut debouncer = TypingDebouncer::new(QUIET);
        debouncer.keystroke(start);
        assert!(debouncer.expire(start + QUIET));
        assert!(!debouncer.expire(start + QUIET * 2));
    }

    #[test]
    fn stop_cancels_and_next_keystroke_restarts() {
        let start = Instant::now();
        let mut debouncer = TypingDebouncer::new(QUIET);
        debouncer.keystroke(start);
        debouncer.stop();
        assert_eq!(debouncer.deadline(), None);
        assert!(!debouncer.expire(start + QUIET));
        assert!(debouncer.keystroke(start + Duration::from_millis(10)));
    }
}
