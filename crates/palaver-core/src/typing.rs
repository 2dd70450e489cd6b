// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timestamp-based typing freshness.
//!
//! Where the transport only delivers item diffs, "is the other party typing"
//! is derived from the last typing timestamp the other party wrote: it is
//! typing iff that timestamp is less than the freshness window old.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// How long a typing assertion stays valid without a refresh.
pub const TYPING_FRESHNESS: Duration = Duration::from_millis(4000);

/// `true` iff `at` is set and `now - at < window`.
///
/// Timestamps in the future (clock skew) count as fresh.
pub fn is_fresh_within(at: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
    let Some(at) = at else {
        return false;
    };
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
    now.signed_duration_since(at) < window
}

/// [`is_fresh_within`] using [`TYPING_FRESHNESS`].
pub fn is_typing_fresh(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    is_fresh_within(at, now, TYPING_FRESHNESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn fresh_inside_window_stale_at_boundary() {
        assert!(is_typing_fresh(Some(t(0)), t(0)));
        assert!(is_typing_fresh(Some(t(0)), t(3999)));
        assert!(!is_typing_fresh(Some(t(0)), t(4000)));
        assert!(!is_typing_fresh(Some(t(0)), t(10_000)));
    }

    #[test]
    fn missing_timestamp_is_not_typing() {
        assert!(!is_typing_fresh(None, t(0)));
    }

    #[test]
    fn future_timestamp_counts_as_typing() {
        assert!(is_typing_fresh(Some(t(500)), t(0)));
    }
}
