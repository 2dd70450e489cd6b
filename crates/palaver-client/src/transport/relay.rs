// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport over the self-hosted relay's WebSocket protocol.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use palaver_core::{ClientFrame, PalaverError, Sender, ServerFrame, SessionId};

use super::{Connector, Transport, TransportEvent};

/// Connects to the relay's `/ws` endpoint.
#[derive(Clone)]
pub struct RelayConnector {
    url: String,
    token: Option<String>,
}

impl std::fmt::Debug for RelayConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConnector")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl RelayConnector {
    /// `token` is presented as a bearer credential; the relay marks the peer admin.
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl Connector for RelayConnector {
    fn name(&self) -> &'static str {
        "relay"
    }

    async fn connect(&self) -> Result<Box<dyn Transport>, PalaverError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| PalaverError::transport(format!("invalid relay url {}", self.url), e))?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| PalaverError::Config(format!("invalid relay token: {e}")))?;
            request.headers_mut().insert("authorization", value);
        }
        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| PalaverError::transport(format!("failed to connect to {}", self.url), e))?;
        info!(url = %self.url, "relay transport connected");
        Ok(Box::new(RelayTransport { stream }))
    }
}

struct RelayTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RelayTransport {
    async fn send_frame(&mut self, frame: ClientFrame) -> Result<(), PalaverError> {
        let text = serde_json::to_string(&frame)
            .map_err(|e| PalaverError::Internal(format!("failed to encode frame: {e}")))?;
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| PalaverError::transport(format!("failed to send {}", frame.kind()), e))
    }
}

fn to_event(frame: ServerFrame) -> TransportEvent {
    match frame {
        ServerFrame::Messages { messages } => TransportEvent::Snapshot(messages),
        ServerFrame::NewMessage { message } => TransportEvent::Message(message),
        ServerFrame::Typing { sender, is_typing } => TransportEvent::Typing { sender, is_typing },
        ServerFrame::StatusChange { online } => TransportEvent::Presence(online),
        ServerFrame::SessionClosed { session_id } => TransportEvent::SessionClosed(session_id),
        ServerFrame::Error { message } => TransportEvent::Rejected(message),
    }
}

#[async_trait]
impl Transport for RelayTransport {
    async fn subscribe_presence(&mut self) -> Result<(), PalaverError> {
        self.send_frame(ClientFrame::SubscribeStatus).await
    }

    async fn join(&mut self, session: SessionId) -> Result<(), PalaverError> {
        self.send_frame(ClientFrame::join(session)).await
    }

    async fn send_message(
        &mut self,
        session: SessionId,
        sender: Sender,
        body: &str,
    ) -> Result<(), PalaverError> {
        self.send_frame(ClientFrame::message(session, sender, body))
            .await
    }

    async fn send_typing(
        &mut self,
        session: SessionId,
        sender: Sender,
        is_typing: bool,
    ) -> Result<(), PalaverError> {
        self.send_frame(ClientFrame::typing(session, sender, is_typing))
            .await
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => match ServerFrame::parse(text.as_str()) {
                    Ok(frame) => return Some(to_event(frame)),
                    Err(e) => debug!(error = %e, "ignoring unparseable relay frame"),
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "relay socket error");
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::{ChatMessage, MessageId};

    #[test]
    fn server_frames_map_to_events() {
        let message = ChatMessage {
            id: MessageId(1),
            session: Some(SessionId(2)),
            sender: Sender::Admin,
            body: "hi".into(),
            created_at: chrono::Utc::now(),
            read: false,
        };
        assert_eq!(
            to_event(ServerFrame::NewMessage {
                message: message.clone()
            }),
            TransportEvent::Message(message)
        );
        assert_eq!(
            to_event(ServerFrame::StatusChange { online: true }),
            TransportEvent::Presence(true)
        );
        assert_eq!(
            to_event(ServerFrame::SessionClosed {
                session_id: SessionId(2)
            }),
            TransportEvent::SessionClosed(SessionId(2))
        );
        assert_eq!(
            to_event(ServerFrame::error("Empty message")),
            TransportEvent::Rejected("Empty message".into())
        );
    }

    #[test]
    fn debug_redacts_token() {
        let connector = RelayConnector::new("ws://x/ws", Some("secret".into()));
        let shown = format!("{connector:?}");
        assert!(!shown.contains("secret"));
        assert!(shown.contains("REDACTED"));
    }
}
