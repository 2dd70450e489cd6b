// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket endpoint.
//!
//! Each connection gets an outbound queue drained by a writer task, while
//! the read loop feeds text frames to the [`Relay`](crate::Relay) one at a
//! time. The read loop ends on close, socket error or server shutdown, and
//! the peer is always unregistered on the way out.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::server::RelayState;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Admin token for clients that cannot set headers.
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<RelayState>,
    Query(params): Query<WsParams>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Response {
    let presented = bearer.as_ref().map(|TypedHeader(header)| header.token());
    let admin = state.auth.is_admin(presented, params.token.as_deref());
    ws.on_upgrade(move |socket| handle_socket(socket, state, admin))
}

async fn handle_socket(socket: WebSocket, state: RelayState, admin: bool) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (peer, mut outbound) = state.relay.open_peer(admin);

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        let next = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            next = ws_receiver.next() => next,
        };
        match next {
            Some(Ok(Message::Text(text))) => state.relay.handle_text(peer, text.as_str()).await,
            Some(Ok(Message::Close(_))) | None => break,
            // Binary frames are not part of the protocol; ping/pong is
            // answered by the socket layer.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(peer = %peer, error = %e, "socket error");
                break;
            }
        }
    }

    state.relay.close_peer(peer);
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_default_to_no_token() {
        let params: WsParams = serde_json::from_str("{}").unwrap();
        assert!(params.token.is_none());
    }

    #[test]
    fn params_carry_token() {
        let params: WsParams = serde_json::from_str(r#"{"token":"s3cret"}"#).unwrap();
        assert_eq!(params.token.as_deref(), Some("s3cret"));
    }
}
