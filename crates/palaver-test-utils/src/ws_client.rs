// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal WebSocket client for driving a relay in tests.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use palaver_core::{ClientFrame, PalaverError, ServerFrame};

/// How long [`WsTestClient::recv`] waits before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// One test connection to a relay.
pub struct WsTestClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTestClient {
    /// Connects without credentials.
    pub async fn connect(url: &str) -> Result<Self, PalaverError> {
        Self::connect_with_token(url, None).await
    }

    /// Connects presenting `token` as a bearer credential.
    pub async fn connect_with_token(url: &str, token: Option<&str>) -> Result<Self, PalaverError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| PalaverError::transport(format!("invalid url {url}"), e))?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| PalaverError::transport("invalid token header", e))?;
            request.headers_mut().insert("authorization", value);
        }
        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| PalaverError::transport(format!("failed to connect to {url}"), e))?;
        Ok(Self { stream })
    }

    /// Sends a protocol frame.
    pub async fn send(&mut self, frame: &ClientFrame) -> Result<(), PalaverError> {
        let text = serde_json::to_string(frame)
            .map_err(|e| PalaverError::Internal(format!("failed to encode frame: {e}")))?;
        self.send_raw(&text).await
    }

    /// Sends arbitrary text, valid or not.
    pub async fn send_raw(&mut self, text: &str) -> Result<(), PalaverError> {
        self.stream
            .send(Message::Text(text.to_string().into()))
            .await
            .map_err(|e| PalaverError::transport("failed to send frame", e))
    }

    /// Next server frame, skipping control frames.
    pub async fn recv(&mut self) -> Result<ServerFrame, PalaverError> {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let next = tokio::time::timeout_at(deadline, self.stream.next())
                .await
                .map_err(|_| PalaverError::Timeout {
                    duration: RECV_TIMEOUT,
                })?;
            match next {
                Some(Ok(Message::Text(text))) => return ServerFrame::parse(text.as_str()),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(PalaverError::Transport {
                        message: "connection closed".to_string(),
                        source: None,
                    });
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(PalaverError::transport("socket error", e)),
            }
        }
    }

    /// Skips frames until one matches `accept`.
    pub async fn recv_until<F>(&mut self, accept: F) -> Result<ServerFrame, PalaverError>
    where
        F: Fn(&ServerFrame) -> bool,
    {
        loop {
            let frame = self.recv().await?;
            if accept(&frame) {
                return Ok(frame);
            }
        }
    }

    /// `true` if no text frame arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> bool {
        loop {
            match tokio::time::timeout(window, self.stream.next()).await {
                Err(_) => return true,
                Ok(Some(Ok(Message::Text(_)))) => return false,
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
                Ok(_) => return true,
            }
        }
    }

    /// Closes the connection.
    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
