// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ChatStore`] backed by a headless CMS item API.
//!
//! Collections: `chat_sessions`, `chat_messages` and the `chat_settings`
//! singleton. Responses are wrapped as `{"data": ...}`; errors as
//! `{"errors": [{"message": ...}]}`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use palaver_core::{
    AdapterType, ChatMessage, ChatSession, ChatStore, HealthStatus, NewMessage, NewSession,
    PalaverError, PluginAdapter, PresenceState, SessionField, SessionId, SessionStatus,
};

use crate::presence_file::PresenceFile;

const MESSAGE_FIELDS: &str = "id,session,sender,message,date_created,read";
const SESSION_FIELDS: &str = "id,visitor_name,visitor_email,visitor_phone,status,last_message_at,admin_typing_at,visitor_typing_at";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct CmsErrors {
    errors: Vec<CmsErrorItem>,
}

#[derive(Debug, Deserialize)]
struct CmsErrorItem {
    message: String,
}

/// CMS REST binding with a local presence fallback.
#[derive(Debug, Clone)]
pub struct CmsStore {
    client: reqwest::Client,
    base_url: String,
    fallback: PresenceFile,
    defaults: PresenceState,
}

impl CmsStore {
    /// Creates a binding against `base_url`, authenticating with `token` if given.
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout: Duration,
        fallback: PresenceFile,
        defaults: PresenceState,
    ) -> Result<Self, PalaverError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| PalaverError::Config(format!("invalid CMS token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| PalaverError::store("failed to build HTTP client", e))?;

        Url::parse(base_url)
            .map_err(|e| PalaverError::Config(format!("invalid store.cms_url `{base_url}`: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            fallback,
            defaults,
        })
    }

    fn url(&self, path: &str) -> Result<Url, PalaverError> {
        Url::parse(&format!("{}/{path}", self.base_url))
            .map_err(|e| PalaverError::Internal(format!("bad CMS url for `{path}`: {e}")))
    }

    async fn send(
        &self,
        op: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, PalaverError> {
        let response = request
            .send()
            .await
            .map_err(|e| PalaverError::store(format!("{op}: request failed"), e))?;
        let status = response.status();
        debug!(op, status = %status, "CMS response");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<CmsErrors>(&body)
            .ok()
            .and_then(|e| e.errors.into_iter().next())
            .map(|e| e.message)
            .unwrap_or(body);
        if status == StatusCode::NOT_FOUND {
            return Err(PalaverError::NotFound {
                kind: "item",
                id: op.to_string(),
            });
        }
        Err(PalaverError::Store {
            message: format!("{op}: CMS returned {status}: {detail}"),
            source: None,
        })
    }

    async fn data<T: DeserializeOwned>(
        &self,
        op: &str,
        response: reqwest::Response,
    ) -> Result<T, PalaverError> {
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| PalaverError::store(format!("{op}: unexpected response body"), e))?;
        Ok(envelope.data)
    }

    /// Fills empty canned texts from the configured defaults.
    fn normalise(&self, mut presence: PresenceState) -> PresenceState {
        if presence.welcome_message.trim().is_empty() {
            presence.welcome_message = self.defaults.welcome_message.clone();
        }
        if presence.offline_message.trim().is_empty() {
            presence.offline_message = self.defaults.offline_message.clone();
        }
        presence
    }

    async fn read_presence_remote(&self) -> Result<PresenceState, PalaverError> {
        let op = "read presence";
        let response = self.send(op, self.client.get(self.url("items/chat_settings")?)).await?;
        let data: serde_json::Value = self.data(op, response).await?;
        // Singletons come back as an object, plain collections as a list.
        let record = match data {
            serde_json::Value::Array(items) => items.into_iter().next(),
            serde_json::Value::Null => None,
            other => Some(other),
        };
        match record {
            Some(record) => serde_json::from_value(record)
                .map_err(|e| PalaverError::store(format!("{op}: malformed record"), e)),
            None => Ok(self.defaults.clone()),
        }
    }

    async fn write_presence_remote(&self, online: bool) -> Result<(), PalaverError> {
        let request = self
            .client
            .patch(self.url("items/chat_settings")?)
            .json(&json!({ "admin_online": online }));
        self.send("write presence", request).await?;
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for CmsStore {
    fn name(&self) -> &str {
        "cms"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, PalaverError> {
        match self
            .send("ping", self.client.get(self.url("server/ping")?))
            .await
        {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), PalaverError> {
        Ok(())
    }
}

#[async_trait]
impl ChatStore for CmsStore {
    async fn create_session(&self, new: NewSession) -> Result<ChatSession, PalaverError> {
        let op = "create session";
        let body = json!({
            "visitor_name": new.visitor_name,
            "visitor_email": new.visitor_email,
            "visitor_phone": new.visitor_phone,
            "status": SessionStatus::Active,
            "last_message_at": Utc::now(),
        });
        let response = self
            .send(op, self.client.post(self.url("items/chat_sessions")?).json(&body))
            .await?;
        self.data(op, response).await
    }

    async fn read_session(&self, id: SessionId) -> Result<ChatSession, PalaverError> {
        let op = "read session";
        let mut url = self.url(&format!("items/chat_sessions/{id}"))?;
        url.query_pairs_mut().append_pair("fields", SESSION_FIELDS);
        let not_found = || PalaverError::NotFound {
            kind: "session",
            id: id.to_string(),
        };
        let response = match self.send(op, self.client.get(url)).await {
            Err(PalaverError::NotFound { .. }) => return Err(not_found()),
            other => other?,
        };
        let session: Option<ChatSession> = self.data(op, response).await?;
        session.ok_or_else(not_found)
    }

    async fn update_session_field(
        &self,
        id: SessionId,
        field: SessionField,
    ) -> Result<(), PalaverError> {
        if let SessionField::Status(to) = field {
            let current = self.read_session(id).await?;
            if !current.status.can_transition_to(to) {
                return Err(PalaverError::InvalidTransition {
                    from: current.status,
                    to,
                });
            }
        }
        let request = self
            .client
            .patch(self.url(&format!("items/chat_sessions/{id}"))?)
            .json(&field.to_patch());
        match self.send("update session", request).await {
            Err(PalaverError::NotFound { .. }) => Err(PalaverError::NotFound {
                kind: "session",
                id: id.to_string(),
            }),
            other => other.map(|_| ()),
        }
    }

    async fn create_message(&self, new: NewMessage) -> Result<ChatMessage, PalaverError> {
        let op = "create message";
        let body = json!({
            "session": new.session,
            "sender": new.sender,
            "message": new.body,
            "read": false,
        });
        let mut url = self.url("items/chat_messages")?;
        url.query_pairs_mut().append_pair("fields", MESSAGE_FIELDS);
        let response = self.send(op, self.client.post(url).json(&body)).await?;
        self.data(op, response).await
    }

    async fn list_messages(
        &self,
        session: SessionId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChatMessage>, PalaverError> {
        let op = "list messages";
        let mut filter = json!({ "session": { "_eq": session } });
        if let Some(since) = since {
            filter["date_created"] = json!({ "_gt": since });
        }
        let mut url = self.url("items/chat_messages")?;
        url.query_pairs_mut()
            .append_pair("filter", &filter.to_string())
            .append_pair("sort", "date_created,id")
            .append_pair("fields", MESSAGE_FIELDS)
            .append_pair("limit", "-1");
        let response = self.send(op, self.client.get(url)).await?;
        let mut messages: Vec<ChatMessage> = self.data(op, response).await?;
        messages.sort_by_key(|m| (m.created_at, m.id));
        Ok(messages)
    }

    async fn read_presence(&self) -> Result<PresenceState, PalaverError> {
        match self.read_presence_remote().await {
            Ok(presence) => Ok(self.normalise(presence)),
            Err(e) => {
                warn!(error = %e, path = %self.fallback.path().display(), "presence singleton unavailable, reading fallback file");
                self.fallback.load().await.map(|p| self.normalise(p))
            }
        }
    }

    async fn write_presence(&self, online: bool) -> Result<(), PalaverError> {
        match self.write_presence_remote(online).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, path = %self.fallback.path().display(), "presence singleton unavailable, writing fallback file");
                self.fallback.store_online(online).await.map(|_| ())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::Sender;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer, dir: &tempfile::TempDir) -> CmsStore {
        CmsStore::new(
            &server.uri(),
            Some("static-token"),
            Duration::from_secs(5),
            PresenceFile::new(dir.path().join("presence.json"), PresenceState::default()),
            PresenceState::default(),
        )
        .unwrap()
    }

    fn message_json(id: u64, body: &str, at: &str) -> serde_json::Value {
        json!({
            "id": id,
            "session": 42,
            "sender": "visitor",
            "message": body,
            "date_created": at,
            "read": false
        })
    }

    #[tokio::test]
    async fn create_message_posts_item_with_read_false() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("POST"))
            .and(path("/items/chat_messages"))
            .and(header("authorization", "Bearer static-token"))
            .and(body_json(json!({
                "session": 42,
                "sender": "visitor",
                "message": "hello",
                "read": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": message_json(7, "hello", "2026-03-01T10:00:00.000Z")
            })))
            .expect(1)
            .mount(&server)
            .await;

        let msg = store(&server, &dir)
            .create_message(NewMessage::new(SessionId(42), Sender::Visitor, "hello").unwrap())
            .await
            .unwrap();
        assert_eq!(msg.id.0, 7);
        assert_eq!(msg.body, "hello");
    }

    #[tokio::test]
    async fn list_messages_filters_by_session_and_since() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/items/chat_messages"))
            .and(query_param("sort", "date_created,id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    message_json(9, "later", "2026-03-01T10:00:02.000Z"),
                    message_json(8, "sooner", "2026-03-01T10:00:01.000Z")
                ]
            })))
            .mount(&server)
            .await;

        let since = "2026-03-01T10:00:00Z".parse().unwrap();
        let msgs = store(&server, &dir)
            .list_messages(SessionId(42), Some(since))
            .await
            .unwrap();
        let bodies: Vec<_> = msgs.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["sooner", "later"]);

        let requests = server.received_requests().await.unwrap();
        let filter = requests[0]
            .url
            .query_pairs()
            .find(|(k, _)| k == "filter")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        let filter: serde_json::Value = serde_json::from_str(&filter).unwrap();
        assert_eq!(
            filter,
            json!({
                "session": {"_eq": 42},
                "date_created": {"_gt": "2026-03-01T10:00:00Z"}
            })
        );
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/items/chat_sessions/5"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "errors": [{"message": "Item not found"}]
            })))
            .mount(&server)
            .await;

        let err = store(&server, &dir)
            .read_session(SessionId(5))
            .await
            .unwrap_err();
        assert!(matches!(err, PalaverError::NotFound { kind: "session", .. }));
    }

    #[tokio::test]
    async fn upstream_error_message_is_surfaced() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("POST"))
            .and(path("/items/chat_messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "errors": [{"message": "Value for field \"session\" is invalid"}]
            })))
            .mount(&server)
            .await;

        let err = store(&server, &dir)
            .create_message(NewMessage::new(SessionId(1), Sender::Admin, "x").unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is invalid"), "{err}");
    }

    #[tokio::test]
    async fn typing_update_patches_single_field() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("PATCH"))
            .and(path("/items/chat_sessions/3"))
            .and(body_json(json!({ "visitor_typing_at": null })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {"id": 3} })))
            .expect(1)
            .mount(&server)
            .await;

        store(&server, &dir)
            .update_session_field(
                SessionId(3),
                SessionField::TypingAt {
                    role: Sender::Visitor,
                    at: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn closing_archived_session_is_rejected_without_patch() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/items/chat_sessions/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"id": 3, "status": "archived"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = store(&server, &dir)
            .update_session_field(SessionId(3), SessionField::Status(SessionStatus::Closed))
            .await
            .unwrap_err();
        assert!(matches!(err, PalaverError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn presence_reads_singleton_and_fills_blank_texts() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/items/chat_settings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"admin_online": true, "welcome_message": "", "offline_message": "gone"}
            })))
            .mount(&server)
            .await;

        let presence = store(&server, &dir).read_presence().await.unwrap();
        assert!(presence.online);
        assert_eq!(presence.welcome_message, palaver_core::types::DEFAULT_WELCOME_MESSAGE);
        assert_eq!(presence.offline_message, "gone");
    }

    #[tokio::test]
    async fn presence_falls_back_to_local_file() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(wiremock::matchers::path("/items/chat_settings"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "errors": [{"message": "You don't have permission to access this."}]
            })))
            .mount(&server)
            .await;

        let store = store(&server, &dir);
        store.write_presence(true).await.unwrap();
        assert!(store.read_presence().await.unwrap().online);
        assert!(dir.path().join("presence.json").exists());
    }
}
