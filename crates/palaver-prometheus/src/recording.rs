// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. Without an installed recorder every call is a no-op.

use metrics::{describe_counter, describe_gauge};

/// Register all Palaver metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("palaver_frames_total", "Inbound relay frames by kind");
    describe_counter!("palaver_fanout_total", "Outbound frames queued to peers by kind");
    describe_counter!(
        "palaver_store_errors_total",
        "Failed store calls by operation"
    );
    describe_gauge!("palaver_connected_peers", "Open relay connections");
    describe_gauge!("palaver_active_sessions", "Sessions with at least one joined peer");
    describe_gauge!("palaver_freshness_polls", "Running per-session freshness polls");
}

/// Record one inbound frame.
pub fn record_frame(kind: &'static str) {
    metrics::counter!("palaver_frames_total", "kind" => kind).increment(1);
}

/// Record frames queued to peers.
pub fn record_fanout(kind: &'static str, peers: usize) {
    metrics::counter!("palaver_fanout_total", "kind" => kind).increment(peers as u64);
}

/// Record a failed store call.
pub fn record_store_error(op: &'static str) {
    metrics::counter!("palaver_store_errors_total", "op" => op).increment(1);
}

/// Set the number of open connections.
pub fn set_connected_peers(count: usize) {
    metrics::gauge!("palaver_connected_peers").set(count as f64);
}

/// Set the number of sessions with joined peers.
pub fn set_active_sessions(count: usize) {
    metrics::gauge!("palaver_active_sessions").set(count as f64);
}

/// Set the number of running freshness polls.
pub fn set_freshness_polls(count: usize) {
    metrics::gauge!("palaver_freshness_polls").set(count as f64);
}
