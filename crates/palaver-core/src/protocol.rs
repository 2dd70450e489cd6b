// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire protocol for the relay.
//!
//! WebSocket text frames carry one JSON object each, discriminated by `type`.
//!
//! Client -> Server:
//! ```json
//! {"type": "join", "sessionId": 42}
//! {"type": "message", "sessionId": 42, "sender": "visitor", "message": "hello"}
//! {"type": "typing", "sessionId": 42, "sender": "visitor", "isTyping": true}
//! {"type": "subscribe_status"}
//! {"type": "status_change", "online": true}
//! ```
//!
//! Server -> Client:
//! ```json
//! {"type": "messages", "messages": [...]}
//! {"type": "new_message", "message": {...}}
//! {"type": "typing", "sender": "admin", "isTyping": true}
//! {"type": "status_change", "online": true}
//! {"type": "session_closed", "sessionId": 42}
//! {"type": "error", "message": "Empty message"}
//! ```
//!
//! The HTTP polling surface shares the same camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PalaverError;
use crate::types::{ChatMessage, PresenceState, Sender, SessionId};

/// A frame sent by a client to the relay.
///
/// Session ids are kept as raw JSON so that a bad id can be reported with a
/// precise error instead of failing the whole frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    Join {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<serde_json::Value>,
    },
    Message {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Typing {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default)]
        is_typing: bool,
    },
    SubscribeStatus,
    StatusChange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        online: Option<bool>,
    },
}

impl ClientFrame {
    /// Parses one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, PalaverError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|_| PalaverError::Protocol("Invalid JSON".to_string()))?;
        serde_json::from_value(value)
            .map_err(|e| PalaverError::Protocol(format!("Unsupported frame: {e}")))
    }

    /// `join` for a known session.
    pub fn join(session: SessionId) -> Self {
        ClientFrame::Join {
            session_id: Some(session.0.into()),
        }
    }

    /// `message` for a known session.
    pub fn message(session: SessionId, sender: Sender, body: &str) -> Self {
        ClientFrame::Message {
            session_id: Some(session.0.into()),
            sender: Some(sender.to_string()),
            message: Some(body.to_string()),
        }
    }

    /// `typing` for a known session.
    pub fn typing(session: SessionId, sender: Sender, is_typing: bool) -> Self {
        ClientFrame::Typing {
            session_id: Some(session.0.into()),
            sender: Some(sender.to_string()),
            is_typing,
        }
    }

    /// Short name used for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Join { .. } => "join",
            ClientFrame::Message { .. } => "message",
            ClientFrame::Typing { .. } => "typing",
            ClientFrame::SubscribeStatus => "subscribe_status",
            ClientFrame::StatusChange { .. } => "status_change",
        }
    }
}

/// A frame sent by the relay to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// Full ordered snapshot of a session's messages.
    Messages { messages: Vec<ChatMessage> },
    /// A single newly created message.
    NewMessage { message: ChatMessage },
    /// The asserting party started or stopped typing.
    Typing { sender: Sender, is_typing: bool },
    /// Operator presence changed.
    StatusChange { online: bool },
    /// The session was closed by an operator.
    SessionClosed { session_id: SessionId },
    /// The previous client frame was rejected.
    Error { message: String },
}

impl ServerFrame {
    /// Serializes the frame to its JSON text form.
    pub fn encode(&self) -> Result<String, PalaverError> {
        serde_json::to_string(self)
            .map_err(|e| PalaverError::Internal(format!("failed to encode frame: {e}")))
    }

    /// Parses a frame received from the relay.
    pub fn parse(text: &str) -> Result<Self, PalaverError> {
        serde_json::from_str(text)
            .map_err(|e| PalaverError::Protocol(format!("invalid server frame: {e}")))
    }

    /// Shorthand for an error frame.
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }

    /// Short name used for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Messages { .. } => "messages",
            ServerFrame::NewMessage { .. } => "new_message",
            ServerFrame::Typing { .. } => "typing",
            ServerFrame::StatusChange { .. } => "status_change",
            ServerFrame::SessionClosed { .. } => "session_closed",
            ServerFrame::Error { .. } => "error",
        }
    }
}

/// Body of `POST /poll`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Sender>,
}

/// Response of `POST /poll`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub online: bool,
    pub welcome_message: String,
    pub offline_message: String,
    /// `active`, `closed`, `archived`, or `unknown` when the session could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_typing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
}

impl PollResponse {
    /// A presence-only response.
    pub fn from_presence(presence: PresenceState) -> Self {
        Self {
            online: presence.online,
            welcome_message: presence.welcome_message,
            offline_message: presence.offline_message,
            session_status: None,
            other_typing: None,
            messages: None,
        }
    }
}

/// Body of `POST /typing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRequest {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub sender: Option<Sender>,
    #[serde(default)]
    pub is_typing: bool,
}

/// Body of `POST /status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    pub online: Option<bool>,
}

/// Response of `POST /status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub online: bool,
}

/// Response of `GET /status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub online: bool,
    pub welcome_message: String,
    pub offline_message: String,
}

impl From<PresenceState> for PresenceResponse {
    fn from(p: PresenceState) -> Self {
        Self {
            online: p.online,
            welcome_message: p.welcome_message,
            offline_message: p.offline_message,
        }
    }
}

/// Body of `POST /close-session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseSessionRequest {
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

/// Body of `POST /session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `POST /session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub success: bool,
}

/// Response of `GET /session?id=N`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionValidity {
    pub valid: bool,
    pub session_id: SessionId,
    pub status: String,
}

/// Body of `POST /messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesRequest {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
}

/// Generic `{success}` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response of the token-issuing endpoint used for authenticated subscriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}
