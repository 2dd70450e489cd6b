// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Palaver integration tests.
//!
//! - [`FlakyStore`] - in-memory store with failure injection and call counts
//! - [`TestRelay`] - a real relay on an ephemeral port
//! - [`WsTestClient`] - a WebSocket client speaking the relay protocol

pub mod flaky_store;
pub mod harness;
pub mod ws_client;

pub use flaky_store::{FlakyStore, StoreOp};
pub use harness::{TEST_ADMIN_TOKEN, TestRelay, TestRelayBuilder};
pub use ws_client::WsTestClient;
