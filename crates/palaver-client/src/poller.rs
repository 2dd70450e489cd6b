// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP side of the bridge: the polling fallback and fire-and-forget writes
//! used whenever no live transport is up.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use palaver_core::protocol::{
    ErrorResponse, MessagesRequest, PollRequest, PollResponse, SuccessResponse, TypingRequest,
};
use palaver_core::{ChatMessage, PalaverError, Sender, SessionId};

/// The relay's HTTP polling surface, as seen by the bridge.
#[async_trait]
pub trait PollApi: Send + Sync {
    /// One `POST /poll` round trip.
    async fn poll(&self, request: &PollRequest) -> Result<PollResponse, PalaverError>;

    /// Sends a message through `POST /messages`.
    async fn send_message(
        &self,
        session: SessionId,
        sender: Sender,
        body: &str,
    ) -> Result<ChatMessage, PalaverError>;

    /// Asserts or clears typing through `POST /typing`.
    async fn send_typing(
        &self,
        session: SessionId,
        sender: Sender,
        is_typing: bool,
    ) -> Result<(), PalaverError>;
}

/// [`PollApi`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpPoller {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPoller {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PalaverError> {
        Url::parse(base_url)
            .map_err(|e| PalaverError::Config(format!("invalid client.http_url `{base_url}`: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PalaverError::transport("failed to build HTTP client", e))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, PalaverError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| PalaverError::transport(format!("POST {path} failed"), e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error)
                .unwrap_or_else(|_| status.to_string());
            debug!(%status, path, %message, "relay rejected request");
            return Err(PalaverError::Transport {
                message: format!("POST {path}: {message}"),
                source: None,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PalaverError::transport(format!("bad response from {path}"), e))
    }
}

#[async_trait]
impl PollApi for HttpPoller {
    async fn poll(&self, request: &PollRequest) -> Result<PollResponse, PalaverError> {
        self.post("poll", request).await
    }

    async fn send_message(
        &self,
        session: SessionId,
        sender: Sender,
        body: &str,
    ) -> Result<ChatMessage, PalaverError> {
        let request = MessagesRequest {
            session_id: Some(session),
            operation: Some("send".to_string()),
            message: Some(body.to_string()),
            sender: Some(sender.to_string()),
        };
        self.post("messages", &request).await
    }

    async fn send_typing(
        &self,
        session: SessionId,
        sender: Sender,
        is_typing: bool,
    ) -> Result<(), PalaverError> {
        let request = TypingRequest {
            session_id: Some(session),
            sender: Some(sender),
            is_typing,
        };
        let response: SuccessResponse = self.post("typing", &request).await?;
        if response.success {
            Ok(())
        } else {
            Err(PalaverError::Transport {
                message: "typing update was not stored".to_string(),
                source: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn poller(server: &MockServer) -> HttpPoller {
        HttpPoller::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn poll_sends_cursor_and_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/poll"))
            .and(body_partial_json(json!({
                "sessionId": 7,
                "since": "2026-01-01T00:00:00Z",
                "role": "visitor"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "online": true,
                "welcomeMessage": "hi",
                "offlineMessage": "bye",
                "sessionStatus": "active",
                "otherTyping": true,
                "messages": [{
                    "id": 3, "sender": "admin", "message": "yo",
                    "date_created": "2026-01-01T00:00:01Z", "read": false
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = poller(&server)
            .poll(&PollRequest {
                session_id: Some(SessionId(7)),
                since: Some("2026-01-01T00:00:00Z".parse().unwrap()),
                role: Some(Sender::Visitor),
            })
            .await
            .unwrap();

        assert!(response.online);
        assert_eq!(response.other_typing, Some(true));
        assert_eq!(response.messages.unwrap()[0].body, "yo");
    }

    #[tokio::test]
    async fn presence_only_poll_omits_session_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/poll"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "online": false,
                "welcomeMessage": "hi",
                "offlineMessage": "bye"
            })))
            .mount(&server)
            .await;

        let response = poller(&server).poll(&PollRequest::default()).await.unwrap();
        assert!(!response.online);
        assert_eq!(response.session_status, None);
        assert_eq!(response.messages, None);
    }

    #[tokio::test]
    async fn error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "Message is required"})),
            )
            .mount(&server)
            .await;

        let err = poller(&server)
            .send_message(SessionId(1), Sender::Visitor, "x")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Message is required"), "{err}");
    }

    #[tokio::test]
    async fn send_message_posts_send_operation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(body_partial_json(json!({
                "sessionId": 4, "operation": "send", "message": "hello", "sender": "admin"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 11, "session": 4, "sender": "admin", "message": "hello",
                "date_created": "2026-01-01T00:00:00Z", "read": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let message = poller(&server)
            .send_message(SessionId(4), Sender::Admin, "hello")
            .await
            .unwrap();
        assert_eq!(message.id.0, 11);
    }

    #[tokio::test]
    async fn unsuccessful_typing_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/typing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .mount(&server)
            .await;

        assert!(
            poller(&server)
                .send_typing(SessionId(1), Sender::Visitor, true)
                .await
                .is_err()
        );
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(matches!(
            HttpPoller::new("not a url", Duration::from_secs(1)),
            Err(PalaverError::Config(_))
        ));
    }
}
