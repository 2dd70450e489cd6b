// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Palaver chat relay.

use thiserror::Error;

use crate::types::SessionStatus;

/// The primary error type used across all Palaver adapter traits and core operations.
#[derive(Debug, Error)]
pub enum PalaverError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Message/session store failures (network, auth, upstream validation).
    #[error("store error: {message}")]
    Store {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A requested entity does not exist in the store.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Caller input failed validation (empty body, missing session id, bad email).
    #[error("invalid input: {0}")]
    Validation(String),

    /// An inbound frame could not be parsed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The caller lacks the credentials required for the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A session status change that the lifecycle does not allow.
    #[error("session cannot move from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    /// Realtime transport failures (connect, handshake, socket write).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used when an error crosses a request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or invalid caller input.
    Invalid,
    /// Missing or wrong credentials.
    Unauthorized,
    /// Unknown entity.
    NotFound,
    /// The store or transport behind us failed.
    Upstream,
    /// Anything else.
    Internal,
}

impl PalaverError {
    /// Builds a store error from any source error.
    pub fn store<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PalaverError::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Builds a transport error from any source error.
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PalaverError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Classifies this error for HTTP status / frame mapping.
    pub fn class(&self) -> ErrorClass {
        match self {
            PalaverError::Validation(_)
            | PalaverError::Protocol(_)
            | PalaverError::InvalidTransition { .. } => ErrorClass::Invalid,
            PalaverError::Unauthorized(_) => ErrorClass::Unauthorized,
            PalaverError::NotFound { .. } => ErrorClass::NotFound,
            PalaverError::Store { .. }
            | PalaverError::Transport { .. }
            | PalaverError::Timeout { .. } => ErrorClass::Upstream,
            PalaverError::Config(_) | PalaverError::Internal(_) => ErrorClass::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_covers_taxonomy() {
        assert_eq!(
            PalaverError::Validation("empty".into()).class(),
            ErrorClass::Invalid
        );
        assert_eq!(
            PalaverError::Protocol("bad json".into()).class(),
            ErrorClass::Invalid
        );
        assert_eq!(
            PalaverError::Unauthorized("no token".into()).class(),
            ErrorClass::Unauthorized
        );
        assert_eq!(
            PalaverError::NotFound {
                kind: "session",
                id: "7".into()
            }
            .class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            PalaverError::store("down", std::io::Error::other("x")).class(),
            ErrorClass::Upstream
        );
        assert_eq!(
            PalaverError::Internal("oops".into()).class(),
            ErrorClass::Internal
        );
    }

    #[test]
    fn transition_error_names_both_states() {
        let err = PalaverError::InvalidTransition {
            from: SessionStatus::Archived,
            to: SessionStatus::Active,
        };
        assert_eq!(err.to_string(), "session cannot move from archived to active");
    }
}
