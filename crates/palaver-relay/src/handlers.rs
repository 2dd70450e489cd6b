// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.
//!
//! Public: `POST /poll`, `POST /typing`, `GET /status`, `POST /session`,
//! `GET /session?id=N`, `POST /messages`, `GET /health`, `GET /metrics`.
//! Admin: `POST /status`, `POST /close-session`.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use palaver_core::protocol::{
    CloseSessionRequest, CreateSessionRequest, CreateSessionResponse, ErrorResponse,
    MessagesRequest, PollRequest, PollResponse, PresenceResponse, SessionValidity,
    StatusRequest, StatusResponse, SuccessResponse, TypingRequest,
};
use palaver_core::{ErrorClass, HealthStatus, PalaverError, Sender, SessionId};

use crate::server::RelayState;

/// An error on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }

    /// Maps a relay error. Caller-side errors keep their own text; upstream
    /// and internal failures are reported as `context`.
    pub fn from_error(e: PalaverError, context: &str) -> Self {
        let status = match e.class() {
            ErrorClass::Invalid => StatusCode::BAD_REQUEST,
            ErrorClass::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::Upstream => StatusCode::BAD_GATEWAY,
            ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match e {
            PalaverError::Validation(m)
            | PalaverError::Protocol(m)
            | PalaverError::Unauthorized(m) => m,
            PalaverError::NotFound { kind, .. } => format!("{kind} not found"),
            e @ PalaverError::InvalidTransition { .. } => e.to_string(),
            _ => context.to_string(),
        };
        Self { status, message }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Response body for GET /health.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok`, `degraded` or `unhealthy`.
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Store backend name.
    pub store: String,
    /// Detail when the store is not healthy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub peers: usize,
    pub sessions: usize,
}

/// Query of GET /session.
#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    pub id: Option<String>,
}

/// POST /poll
pub async fn post_poll(
    State(state): State<RelayState>,
    Json(body): Json<PollRequest>,
) -> Json<PollResponse> {
    Json(state.relay.poll(body).await)
}

/// POST /typing
///
/// A store failure is reported as `{success: false}` rather than an error.
pub async fn post_typing(
    State(state): State<RelayState>,
    Json(body): Json<TypingRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let (Some(session), Some(sender)) = (body.session_id, body.sender) else {
        return Err(ApiError::bad_request("sessionId and sender are required"));
    };
    let success = state
        .relay
        .publish_typing(session, sender, body.is_typing)
        .await
        .is_ok();
    Ok(Json(SuccessResponse { success }))
}

/// GET /status
pub async fn get_status(State(state): State<RelayState>) -> Json<PresenceResponse> {
    Json(state.relay.presence().await.into())
}

/// POST /status (admin)
pub async fn post_status(
    State(state): State<RelayState>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let online = body
        .online
        .ok_or_else(|| ApiError::bad_request("online (boolean) is required"))?;
    state
        .relay
        .set_presence(online, None)
        .await
        .map_err(|e| ApiError::from_error(e, "Failed to update chat status"))?;
    Ok(Json(StatusResponse {
        success: true,
        online,
    }))
}

/// POST /close-session (admin)
pub async fn post_close_session(
    State(state): State<RelayState>,
    Json(body): Json<CloseSessionRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let session = body
        .session_id
        .ok_or_else(|| ApiError::bad_request("sessionId is required"))?;
    state
        .relay
        .close_session(session)
        .await
        .map_err(|e| ApiError::from_error(e, "Failed to close session"))?;
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /session
pub async fn post_session(
    State(state): State<RelayState>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let session = state
        .relay
        .create_session(body)
        .await
        .map_err(|e| ApiError::from_error(e, "Failed to create chat session"))?;
    Ok(Json(CreateSessionResponse {
        session_id: session.id,
        success: true,
    }))
}

/// GET /session?id=N
pub async fn get_session(
    State(state): State<RelayState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<SessionValidity>, ApiError> {
    let session = query
        .id
        .and_then(|raw| SessionId::from_json(&serde_json::Value::String(raw)))
        .ok_or_else(|| ApiError::bad_request("Session ID is required"))?;
    let validity = state
        .relay
        .session_validity(session)
        .await
        .map_err(|e| ApiError::from_error(e, "Failed to validate session"))?;
    Ok(Json(validity))
}

/// POST /messages
///
/// `send` returns the created message, `list` the ordered history.
pub async fn post_messages(
    State(state): State<RelayState>,
    Json(body): Json<MessagesRequest>,
) -> Result<Response, ApiError> {
    let session = body
        .session_id
        .ok_or_else(|| ApiError::bad_request("Session ID is required"))?;

    match body.operation.as_deref() {
        Some("send") => {
            let text = body
                .message
                .as_deref()
                .filter(|m| !m.is_empty())
                .ok_or_else(|| ApiError::bad_request("Message is required"))?;
            let sender = match body.sender.as_deref() {
                Some("admin") => Sender::Admin,
                _ => Sender::Visitor,
            };
            let message = state
                .relay
                .publish_message(session, sender, text)
                .await
                .map_err(|e| ApiError::from_error(e, "Failed to process chat message"))?;
            Ok(Json(message).into_response())
        }
        Some("list") => {
            let messages = state
                .relay
                .history(session)
                .await
                .map_err(|e| ApiError::from_error(e, "Failed to process chat message"))?;
            Ok(Json(messages).into_response())
        }
        _ => Err(ApiError::bad_request(
            "Invalid operation. Use \"send\" or \"list\".",
        )),
    }
}

/// GET /health
///
/// 200 while the store is healthy or degraded, 503 when it is down.
pub async fn get_health(State(state): State<RelayState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, detail) = match state.relay.store_health().await {
        HealthStatus::Healthy => (StatusCode::OK, "ok", None),
        HealthStatus::Degraded(d) => (StatusCode::OK, "degraded", Some(d)),
        HealthStatus::Unhealthy(d) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", Some(d)),
    };
    let registry = state.relay.registry();
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: state.health.start_time.elapsed().as_secs(),
            store: state.relay.store().name().to_string(),
            detail,
            peers: registry.peer_count(),
            sessions: registry.session_count(),
        }),
    )
}

/// GET /metrics
pub async fn get_metrics(State(state): State<RelayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => ApiError {
            status: StatusCode::NOT_FOUND,
            message: "metrics disabled".to_string(),
        }
        .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::SessionStatus;

    #[test]
    fn error_classes_map_to_status_codes() {
        let cases = [
            (
                PalaverError::Validation("Empty message".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                PalaverError::NotFound {
                    kind: "session",
                    id: "7".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                PalaverError::InvalidTransition {
                    from: SessionStatus::Archived,
                    to: SessionStatus::Closed,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                PalaverError::store("down", std::io::Error::other("refused")),
                StatusCode::BAD_GATEWAY,
            ),
            (
                PalaverError::Internal("bug".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from_error(error, "ctx").status(), expected);
        }
    }

    #[test]
    fn upstream_details_are_not_leaked() {
        let err = ApiError::from_error(
            PalaverError::store("cms at 10.0.0.3 refused", std::io::Error::other("x")),
            "Failed to close session",
        );
        assert_eq!(err.message, "Failed to close session");

        let err = ApiError::from_error(
            PalaverError::NotFound {
                kind: "session",
                id: "9".into(),
            },
            "ctx",
        );
        assert_eq!(err.message, "session not found");
    }

    #[test]
    fn health_response_omits_empty_detail() {
        let json = serde_json::to_value(HealthResponse {
            status: "ok".into(),
            version: "0.1.0".into(),
            uptime_secs: 3,
            store: "memory".into(),
            detail: None,
            peers: 0,
            sessions: 0,
        })
        .unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json.get("detail").is_none());
    }
}
