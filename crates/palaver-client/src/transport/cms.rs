// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport over the CMS realtime channel.
//!
//! The CMS pushes item diffs for subscribed collections:
//!
//! ```json
//! {"type": "subscribe", "collection": "chat_messages", "query": {...}, "uid": "messages"}
//! {"type": "subscription", "event": "init" | "create" | "update" | "delete", "data": [...], "uid": "messages"}
//! {"type": "items", "collection": "chat_messages", "action": "create", "data": {...}}
//! {"type": "auth", "access_token": "..."}  ->  {"type": "auth", "status": "ok" | "error"}
//! {"type": "ping"}  ->  {"type": "pong"}
//! ```
//!
//! Typing is not an event here: it is read off the `*_typing_at` fields of
//! session diffs and turned into [`TransportEvent::TypingAt`].

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use palaver_core::protocol::TokenResponse;
use palaver_core::{ChatMessage, PalaverError, Sender, SessionField, SessionId, SessionStatus};

use super::{Connector, Transport, TransportEvent};

const PRESENCE_UID: &str = "presence";
const MESSAGES_UID: &str = "messages";
const SESSION_UID: &str = "session";

type CmsSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to the CMS realtime endpoint, authenticating when a token
/// endpoint is configured.
#[derive(Debug, Clone)]
pub struct CmsConnector {
    url: String,
    token_url: Option<String>,
    http: reqwest::Client,
}

impl CmsConnector {
    pub fn new(
        url: impl Into<String>,
        token_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PalaverError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PalaverError::transport("failed to build HTTP client", e))?;
        Ok(Self {
            url: url.into(),
            token_url,
            http,
        })
    }

    async fn fetch_token(&self, token_url: &str) -> Result<String, PalaverError> {
        let response = self
            .http
            .get(token_url)
            .send()
            .await
            .map_err(|e| PalaverError::transport("token request failed", e))?;
        if !response.status().is_success() {
            return Err(PalaverError::Unauthorized(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PalaverError::transport("bad token response", e))?;
        if body.token.is_empty() {
            return Err(PalaverError::Unauthorized(
                "No access token available".to_string(),
            ));
        }
        Ok(body.token)
    }
}

#[async_trait]
impl Connector for CmsConnector {
    fn name(&self) -> &'static str {
        "cms"
    }

    async fn connect(&self) -> Result<Box<dyn Transport>, PalaverError> {
        let token = match &self.token_url {
            Some(url) => Some(self.fetch_token(url).await?),
            None => None,
        };

        let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| PalaverError::transport(format!("failed to connect to {}", self.url), e))?;
        let mut transport = CmsTransport {
            stream,
            session: None,
            pending: VecDeque::new(),
        };

        if let (Some(token), Some(token_url)) = (token, &self.token_url) {
            if let Err(e) = transport.authenticate(&token).await {
                warn!(error = %e, "CMS rejected token, retrying with a fresh one");
                let fresh = self.fetch_token(token_url).await?;
                transport.authenticate(&fresh).await?;
            }
        }

        info!(url = %self.url, "CMS transport connected");
        Ok(Box::new(transport))
    }
}

#[derive(Debug, Deserialize)]
struct Incoming {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<CmsError>,
}

#[derive(Debug, Deserialize)]
struct CmsError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl CmsError {
    fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (_, Some(message)) => message.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

struct CmsTransport {
    stream: CmsSocket,
    session: Option<SessionId>,
    pending: VecDeque<TransportEvent>,
}

/// Subscription payloads come as a list or, for singletons, a bare object.
fn items(data: Value) -> Vec<Value> {
    match data {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        item => vec![item],
    }
}

fn typing_field(item: &Value, key: &str) -> Option<Option<DateTime<Utc>>> {
    let raw = item.get(key)?;
    Some(serde_json::from_value(raw.clone()).unwrap_or(None))
}

impl CmsTransport {
    async fn send_json(&mut self, value: Value) -> Result<(), PalaverError> {
        self.stream
            .send(Message::Text(value.to_string().into()))
            .await
            .map_err(|e| PalaverError::transport("failed to write to CMS socket", e))
    }

    async fn read_json(&mut self) -> Option<Incoming> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => match serde_json::from_str(text.as_str()) {
                    Ok(incoming) => return Some(incoming),
                    Err(e) => debug!(error = %e, "ignoring unparseable CMS frame"),
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "CMS socket error");
                    return None;
                }
            }
        }
    }

    async fn authenticate(&mut self, token: &str) -> Result<(), PalaverError> {
        self.send_json(json!({"type": "auth", "access_token": token}))
            .await?;
        loop {
            let Some(reply) = self.read_json().await else {
                return Err(PalaverError::Transport {
                    message: "CMS closed the connection during auth".to_string(),
                    source: None,
                });
            };
            match reply.kind.as_str() {
                "ping" => self.send_json(json!({"type": "pong"})).await?,
                "auth" if reply.status.as_deref() == Some("ok") => return Ok(()),
                "auth" => {
                    let reason = reply
                        .error
                        .map(|e| e.describe())
                        .unwrap_or_else(|| "authentication failed".to_string());
                    return Err(PalaverError::Unauthorized(reason));
                }
                other => debug!(kind = other, "skipping frame before auth reply"),
            }
        }
    }

    async fn subscribe(&mut self, collection: &str, uid: &str, query: Value) -> Result<(), PalaverError> {
        self.send_json(json!({
            "type": "subscribe",
            "collection": collection,
            "query": query,
            "uid": uid,
        }))
        .await
    }

    async fn unsubscribe(&mut self, uid: &str) -> Result<(), PalaverError> {
        self.send_json(json!({"type": "unsubscribe", "uid": uid}))
            .await
    }

    async fn update_session(&mut self, session: SessionId, field: SessionField) -> Result<(), PalaverError> {
        self.send_json(json!({
            "type": "items",
            "collection": "chat_sessions",
            "action": "update",
            "id": session.0,
            "data": field.to_patch(),
        }))
        .await
    }

    /// Turns one CMS frame into zero or more events on `pending`.
    fn absorb(&mut self, incoming: Incoming) {
        if incoming.status.as_deref() == Some("error") {
            let reason = incoming
                .error
                .map(|e| e.describe())
                .unwrap_or_else(|| format!("{} failed", incoming.kind));
            self.pending.push_back(TransportEvent::Rejected(reason));
            return;
        }
        if incoming.kind != "subscription" {
            return;
        }
        let event = incoming.event.as_deref().unwrap_or_default();
        match incoming.uid.as_deref() {
            Some(PRESENCE_UID) => {
                let online = items(incoming.data)
                    .first()
                    .and_then(|item| item.get("admin_online"))
                    .map(|v| v.as_bool().unwrap_or(false));
                if let Some(online) = online {
                    self.pending.push_back(TransportEvent::Presence(online));
                }
            }
            Some(MESSAGES_UID) => {
                let messages: Vec<ChatMessage> = items(incoming.data)
                    .into_iter()
                    .filter_map(|item| match serde_json::from_value(item) {
                        Ok(message) => Some(message),
                        Err(e) => {
                            debug!(error = %e, "skipping malformed message item");
                            None
                        }
                    })
                    .collect();
                match event {
                    "init" => self.pending.push_back(TransportEvent::Snapshot(messages)),
                    "create" => self
                        .pending
                        .extend(messages.into_iter().map(TransportEvent::Message)),
                    _ => {}
                }
            }
            Some(SESSION_UID) => {
                if event != "init" && event != "update" {
                    return;
                }
                for item in items(incoming.data) {
                    for (key, sender) in [
                        ("admin_typing_at", Sender::Admin),
                        ("visitor_typing_at", Sender::Visitor),
                    ] {
                        if let Some(at) = typing_field(&item, key) {
                            self.pending
                                .push_back(TransportEvent::TypingAt { sender, at });
                        }
                    }
                    let closed = item
                        .get("status")
                        .and_then(|s| serde_json::from_value::<SessionStatus>(s.clone()).ok())
                        == Some(SessionStatus::Closed);
                    if let (true, Some(session)) = (closed, self.session) {
                        self.pending
                            .push_back(TransportEvent::SessionClosed(session));
                    }
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Transport for CmsTransport {
    async fn subscribe_presence(&mut self) -> Result<(), PalaverError> {
        self.subscribe(
            "chat_settings",
            PRESENCE_UID,
            json!({"fields": ["admin_online", "welcome_message", "offline_message"]}),
        )
        .await
    }

    async fn join(&mut self, session: SessionId) -> Result<(), PalaverError> {
        if self.session.is_some() {
            self.unsubscribe(MESSAGES_UID).await?;
            self.unsubscribe(SESSION_UID).await?;
        }
        self.session = Some(session);
        self.subscribe(
            "chat_messages",
            MESSAGES_UID,
            json!({
                "fields": ["id", "sender", "message", "date_created", "read"],
                "filter": {"session": {"_eq": session.0}},
                "sort": ["date_created"],
            }),
        )
        .await?;
        self.subscribe(
            "chat_sessions",
            SESSION_UID,
            json!({
                "fields": ["id", "status", "admin_typing_at", "visitor_typing_at"],
                "filter": {"id": {"_eq": session.0}},
            }),
        )
        .await
    }

    async fn send_message(
        &mut self,
        session: SessionId,
        sender: Sender,
        body: &str,
    ) -> Result<(), PalaverError> {
        self.send_json(json!({
            "type": "items",
            "collection": "chat_messages",
            "action": "create",
            "data": {
                "session": session.0,
                "sender": sender,
                "message": body,
                "read": false,
            },
        }))
        .await?;
        self.update_session(session, SessionField::LastMessageAt(Utc::now()))
            .await
    }

    async fn send_typing(
        &mut self,
        session: SessionId,
        sender: Sender,
        is_typing: bool,
    ) -> Result<(), PalaverError> {
        let at = is_typing.then(Utc::now);
        self.update_session(session, SessionField::TypingAt { role: sender, at })
            .await
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let incoming = self.read_json().await?;
            if incoming.kind == "ping" {
                if let Err(e) = self.send_json(json!({"type": "pong"})).await {
                    debug!(error = %e, "failed to answer CMS ping");
                    return None;
                }
                continue;
            }
            self.absorb(incoming);
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type ServerSocket = WebSocketStream<TcpStream>;

    /// Accepts one WebSocket connection and hands the server end back.
    async fn fake_cms() -> (String, oneshot::Receiver<ServerSocket>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/websocket", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let socket = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _ = tx.send(socket);
        });
        (url, rx)
    }

    async fn recv_json(socket: &mut ServerSocket) -> Value {
        loop {
            match socket.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                _ => continue,
            }
        }
    }

    async fn send_json(socket: &mut ServerSocket, value: Value) {
        socket
            .send(Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    fn connector(url: &str, token_url: Option<String>) -> CmsConnector {
        CmsConnector::new(url, token_url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_once() {
        let tokens = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "stale"})))
            .up_to_n_times(1)
            .mount(&tokens)
            .await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "fresh"})))
            .mount(&tokens)
            .await;

        let (url, server) = fake_cms().await;
        let cms = tokio::spawn(async move {
            let mut socket = server.await.unwrap();
            let first = recv_json(&mut socket).await;
            assert_eq!(first["access_token"], "stale");
            send_json(
                &mut socket,
                json!({"type": "auth", "status": "error", "error": {"code": "TOKEN_EXPIRED"}}),
            )
            .await;
            let second = recv_json(&mut socket).await;
            assert_eq!(second["access_token"], "fresh");
            send_json(&mut socket, json!({"type": "auth", "status": "ok"})).await;
            socket
        });

        let transport = connector(&url, Some(format!("{}/token", tokens.uri())))
            .connect()
            .await;
        assert!(transport.is_ok());
        cms.await.unwrap();
    }

    #[tokio::test]
    async fn second_auth_rejection_fails_connect() {
        let tokens = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t"})))
            .expect(2)
            .mount(&tokens)
            .await;

        let (url, server) = fake_cms().await;
        tokio::spawn(async move {
            let mut socket = server.await.unwrap();
            for _ in 0..2 {
                recv_json(&mut socket).await;
                send_json(
                    &mut socket,
                    json!({"type": "auth", "status": "error", "error": {"message": "nope"}}),
                )
                .await;
            }
            socket
        });

        let err = connector(&url, Some(format!("{}/token", tokens.uri())))
            .connect()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PalaverError::Unauthorized(ref m) if m == "nope"));
    }

    #[tokio::test]
    async fn session_subscription_yields_events_and_answers_ping() {
        let (url, server) = fake_cms().await;
        let mut transport = connector(&url, None).connect().await.unwrap();
        let mut socket = server.await.unwrap();

        transport.join(SessionId(7)).await.unwrap();
        let messages_sub = recv_json(&mut socket).await;
        assert_eq!(messages_sub["collection"], "chat_messages");
        assert_eq!(messages_sub["query"]["filter"]["session"]["_eq"], 7);
        let session_sub = recv_json(&mut socket).await;
        assert_eq!(session_sub["collection"], "chat_sessions");

        send_json(
            &mut socket,
            json!({"type": "subscription", "event": "init", "uid": "messages", "data": [
                {"id": 1, "sender": "visitor", "message": "hi", "date_created": "2026-01-01T00:00:00Z", "read": false}
            ]}),
        )
        .await;
        send_json(&mut socket, json!({"type": "ping"})).await;
        send_json(
            &mut socket,
            json!({"type": "subscription", "event": "create", "uid": "messages", "data": [
                {"id": 2, "sender": "admin", "message": "hello", "date_created": "2026-01-01T00:00:05Z", "read": false}
            ]}),
        )
        .await;
        send_json(
            &mut socket,
            json!({"type": "subscription", "event": "update", "uid": "session", "data": [
                {"id": 7, "status": "closed", "admin_typing_at": "2026-01-01T00:00:04Z", "visitor_typing_at": null}
            ]}),
        )
        .await;

        match transport.next_event().await.unwrap() {
            TransportEvent::Snapshot(messages) => assert_eq!(messages[0].body, "hi"),
            other => panic!("expected snapshot, got {other:?}"),
        }
        match transport.next_event().await.unwrap() {
            TransportEvent::Message(message) => assert_eq!(message.id.0, 2),
            other => panic!("expected message, got {other:?}"),
        }
        assert_eq!(recv_json(&mut socket).await, json!({"type": "pong"}));

        assert_eq!(
            transport.next_event().await.unwrap(),
            TransportEvent::TypingAt {
                sender: Sender::Admin,
                at: Some("2026-01-01T00:00:04Z".parse().unwrap()),
            }
        );
        assert_eq!(
            transport.next_event().await.unwrap(),
            TransportEvent::TypingAt {
                sender: Sender::Visitor,
                at: None,
            }
        );
        assert_eq!(
            transport.next_event().await.unwrap(),
            TransportEvent::SessionClosed(SessionId(7))
        );

        socket.close(None).await.unwrap();
        assert_eq!(transport.next_event().await, None);
    }

    #[tokio::test]
    async fn presence_and_writes_use_item_frames() {
        let (url, server) = fake_cms().await;
        let mut transport = connector(&url, None).connect().await.unwrap();
        let mut socket = server.await.unwrap();

        transport.subscribe_presence().await.unwrap();
        assert_eq!(recv_json(&mut socket).await["collection"], "chat_settings");
        send_json(
            &mut socket,
            json!({"type": "subscription", "event": "init", "uid": "presence",
                   "data": {"admin_online": true, "welcome_message": "hi"}}),
        )
        .await;
        assert_eq!(
            transport.next_event().await,
            Some(TransportEvent::Presence(true))
        );

        transport
            .send_message(SessionId(3), Sender::Visitor, "hello")
            .await
            .unwrap();
        let create = recv_json(&mut socket).await;
        assert_eq!(create["action"], "create");
        assert_eq!(create["data"]["session"], 3);
        assert_eq!(create["data"]["sender"], "visitor");
        assert_eq!(create["data"]["read"], false);
        let bump = recv_json(&mut socket).await;
        assert!(bump["data"].get("last_message_at").is_some());

        transport
            .send_typing(SessionId(3), Sender::Visitor, false)
            .await
            .unwrap();
        let typing = recv_json(&mut socket).await;
        assert_eq!(typing["action"], "update");
        assert_eq!(typing["id"], 3);
        assert_eq!(typing["data"], json!({"visitor_typing_at": null}));

        send_json(
            &mut socket,
            json!({"type": "items", "status": "error", "error": {"code": "FORBIDDEN", "message": "no access"}}),
        )
        .await;
        assert_eq!(
            transport.next_event().await,
            Some(TransportEvent::Rejected("no access".into()))
        );
    }
}
