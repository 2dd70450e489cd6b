// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `palaver client` command implementation.
//!
//! Joins one session through a [`BridgeClient`], prints everything that
//! happens to stdout and sends each stdin line as a message. `/quit` or EOF
//! ends the session.

use palaver_client::{BridgeClient, BridgeEvent, ConnectionMode};
use palaver_config::PalaverConfig;
use palaver_core::{PalaverError, Sender, SessionId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::{serve, shutdown};

/// What one line of terminal input asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Skip,
    Send(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Skip,
        "/quit" | "/exit" => Input::Quit,
        text => Input::Send(text),
    }
}

/// Terminal rendering of a bridge event; `None` for events not worth a line.
fn describe(event: &BridgeEvent, role: Sender) -> Option<String> {
    match event {
        BridgeEvent::NewMessage(message) => {
            let time = message.created_at.format("%H:%M:%S");
            let who = if message.sender == role {
                "you".to_string()
            } else {
                message.sender.to_string()
            };
            Some(format!("[{time}] {who}: {}", message.body))
        }
        BridgeEvent::StatusChange(true) => Some("* support is online".to_string()),
        BridgeEvent::StatusChange(false) => Some("* support is offline".to_string()),
        BridgeEvent::SessionClosed(session) => Some(format!("* session {session} was closed")),
        BridgeEvent::TypingChanged(true) => Some(format!("* {} is typing...", role.other())),
        BridgeEvent::TypingChanged(false) => None,
        BridgeEvent::ModeChanged(mode) => Some(format!("* {mode}")),
        BridgeEvent::Rejected(reason) => Some(format!("! {reason}")),
    }
}

/// Runs the `palaver client` command.
pub async fn run_client(
    config: PalaverConfig,
    session: SessionId,
    role: Sender,
) -> Result<(), PalaverError> {
    serve::init_tracing(&config.server.log_level);

    let bridge = BridgeClient::from_config(&config, role)?;
    let mut events = bridge.subscribe();
    let cancel = shutdown::install_signal_handler();

    let mode = bridge.connect().await?;
    bridge.join_session(session).await?;
    if mode == ConnectionMode::Polling {
        println!("* live connection unavailable, polling");
    }
    let snapshot = bridge.snapshot();
    if let Some(online) = snapshot.online {
        let presence = if online { "online" } else { "offline" };
        println!("* support is {presence}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(line) = describe(&event, role) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "terminal fell behind, some events were not shown");
                }
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let line = line.map_err(|e| PalaverError::Internal(format!("stdin: {e}")))?;
                let Some(line) = line else { break };
                match parse_input(&line) {
                    Input::Quit => break,
                    Input::Skip => {}
                    Input::Send(text) => {
                        if let Err(e) = bridge.send_message(text).await {
                            eprintln!("! {e}");
                        }
                    }
                }
            }
            () = cancel.cancelled() => break,
        }
    }

    bridge.disconnect().await?;
    cancel.cancel();
    Ok(())
}
