// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the relay, the stores and the bridge client.
//!
//! Field names on the serialized forms follow the CMS collections
//! (`chat_sessions`, `chat_messages`, `chat_settings`) so that items can be
//! passed through from the store to the wire without remapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

use crate::error::PalaverError;

/// Unique identifier for a chat session. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Parses a session id out of loosely-typed JSON.
    ///
    /// Accepts a positive integer or a string holding one. Anything else
    /// (zero, negative, fractional, non-numeric, null) yields `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let id = match value {
            serde_json::Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            }),
            serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }?;
        (id > 0).then_some(SessionId(id))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        SessionId::from_json(&value).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid session id: {value}"))
        })
    }
}

/// Unique identifier for a chat message, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two parties of a conversation. There is no system or bot role.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sender {
    Visitor,
    Admin,
}

impl Sender {
    /// The opposite party.
    pub fn other(self) -> Self {
        match self {
            Sender::Visitor => Sender::Admin,
            Sender::Admin => Sender::Visitor,
        }
    }

    /// Parses an optional wire value; a missing sender means the visitor.
    pub fn from_wire(value: Option<&str>) -> Result<Self, PalaverError> {
        match value {
            None => Ok(Sender::Visitor),
            Some(raw) => raw.parse().map_err(|_| {
                PalaverError::Validation(format!(
                    "sender must be `visitor` or `admin`, got `{raw}`"
                ))
            }),
        }
    }
}

/// Lifecycle status of a chat session.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Closed,
    Archived,
}

impl SessionStatus {
    /// Whether the lifecycle permits moving from `self` to `to`.
    ///
    /// active -> closed, active|closed -> archived. Sessions are never reopened.
    /// Re-asserting the current status is allowed and is a no-op.
    pub fn can_transition_to(self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, to),
            (Active, Active)
                | (Closed, Closed)
                | (Archived, Archived)
                | (Active, Closed)
                | (Active, Archived)
                | (Closed, Archived)
        )
    }
}

/// One visitor conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    #[serde(default)]
    pub visitor_name: String,
    #[serde(default)]
    pub visitor_email: String,
    #[serde(default)]
    pub visitor_phone: Option<String>,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub admin_typing_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub visitor_typing_at: Option<DateTime<Utc>>,
}

impl ChatSession {
    /// The typing timestamp asserted by `role`.
    pub fn typing_at(&self, role: Sender) -> Option<DateTime<Utc>> {
        match role {
            Sender::Admin => self.admin_typing_at,
            Sender::Visitor => self.visitor_typing_at,
        }
    }

    /// Applies a status change, enforcing the lifecycle.
    pub fn transition(&mut self, to: SessionStatus) -> Result<(), PalaverError> {
        if !self.status.can_transition_to(to) {
            return Err(PalaverError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Applies a single field update.
    pub fn apply(&mut self, field: &SessionField) -> Result<(), PalaverError> {
        match field {
            SessionField::LastMessageAt(at) => self.last_message_at = Some(*at),
            SessionField::TypingAt { role, at } => match role {
                Sender::Admin => self.admin_typing_at = *at,
                Sender::Visitor => self.visitor_typing_at = *at,
            },
            SessionField::Status(status) => self.transition(*status)?,
        }
        Ok(())
    }
}

/// Input for creating a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSession {
    pub visitor_name: String,
    pub visitor_email: String,
    pub visitor_phone: Option<String>,
}

/// A single mutable field of a session item.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionField {
    /// Bumped whenever a message is written.
    LastMessageAt(DateTime<Utc>),
    /// Typing timestamp for one side; `None` clears it.
    TypingAt {
        role: Sender,
        at: Option<DateTime<Utc>>,
    },
    /// Lifecycle status (validated against [`SessionStatus::can_transition_to`]).
    Status(SessionStatus),
}

impl SessionField {
    /// The item patch body understood by the CMS.
    pub fn to_patch(&self) -> serde_json::Value {
        match self {
            SessionField::LastMessageAt(at) => serde_json::json!({ "last_message_at": at }),
            SessionField::TypingAt { role, at } => {
                let key = match role {
                    Sender::Admin => "admin_typing_at",
                    Sender::Visitor => "visitor_typing_at",
                };
                let mut patch = serde_json::Map::new();
                patch.insert(key.to_string(), serde_json::json!(at));
                serde_json::Value::Object(patch)
            }
            SessionField::Status(status) => serde_json::json!({ "status": status }),
        }
    }
}

/// One utterance within a session. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionId>,
    pub sender: Sender,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(rename = "date_created")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

/// Input for creating a message.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub session: SessionId,
    pub sender: Sender,
    pub body: String,
}

impl NewMessage {
    /// Validates and normalises a message body (trimmed, non-empty).
    pub fn new(
        session: SessionId,
        sender: Sender,
        body: &str,
    ) -> Result<Self, PalaverError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(PalaverError::Validation("Empty message".to_string()));
        }
        Ok(Self {
            session,
            sender,
            body: body.to_string(),
        })
    }
}

/// Default greeting shown to visitors when the store holds none.
pub const DEFAULT_WELCOME_MESSAGE: &str = "Hi! How can we help you today?";

/// Default offline notice shown to visitors when the store holds none.
pub const DEFAULT_OFFLINE_MESSAGE: &str =
    "We're currently offline. Please leave your contact info and we'll get back to you shortly!";

/// The global operator presence record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceState {
    #[serde(rename = "admin_online", default)]
    pub online: bool,
    #[serde(default = "default_welcome")]
    pub welcome_message: String,
    #[serde(default = "default_offline")]
    pub offline_message: String,
}

impl Default for PresenceState {
    fn default() -> Self {
        Self {
            online: false,
            welcome_message: default_welcome(),
            offline_message: default_offline(),
        }
    }
}

fn default_welcome() -> String {
    DEFAULT_WELCOME_MESSAGE.to_string()
}

fn default_offline() -> String {
    DEFAULT_OFFLINE_MESSAGE.to_string()
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Store,
    Transport,
    Observability,
}
