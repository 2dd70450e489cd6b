// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Palaver chat relay.
//!
//! This crate provides the error type, the domain types shared by the relay,
//! the stores and the bridge client, the WebSocket/HTTP wire protocol, and the
//! adapter traits every backend implements.

pub mod error;
pub mod protocol;
pub mod traits;
pub mod types;
pub mod typing;

pub use error::{ErrorClass, PalaverError};
pub use protocol::{ClientFrame, ServerFrame};
pub use traits::{ChatStore, PluginAdapter};
pub use types::{
    AdapterType, ChatMessage, ChatSession, HealthStatus, MessageId, NewMessage, NewSession,
    PresenceState, Sender, SessionField, SessionId, SessionStatus,
};
pub use typing::{TYPING_FRESHNESS, is_typing_fresh};
