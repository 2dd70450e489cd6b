// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client side of the Palaver chat relay.
//!
//! [`BridgeClient`] keeps one chat session in sync over a live transport
//! (the relay socket or a CMS item subscription) and falls back to HTTP
//! polling when no live connection can be held. It owns reconnect backoff,
//! typing debounce and decay, and de-duplication of messages that arrive
//! through more than one path.
//!
//! ```no_run
//! use palaver_client::{BridgeClient, BridgeEvent};
//! use palaver_core::{Sender, SessionId};
//!
//! # async fn demo(config: palaver_config::PalaverConfig) -> Result<(), palaver_core::PalaverError> {
//! let bridge = BridgeClient::from_config(&config, Sender::Visitor)?;
//! let mut events = bridge.subscribe();
//! bridge.connect().await?;
//! bridge.join_session(SessionId(1)).await?;
//! bridge.send_message("hello").await?;
//! while let Ok(event) = events.recv().await {
//!     if let BridgeEvent::NewMessage(message) = event {
//!         println!("{}: {}", message.sender, message.body);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod bridge;
pub mod debounce;
pub mod observer;
pub mod poller;
pub mod state;
pub mod transport;

pub use bridge::{BridgeClient, BridgeEvent, BridgeOptions, BridgeSnapshot, ConnectionMode};
pub use poller::{HttpPoller, PollApi};
pub use transport::{CmsConnector, Connector, RelayConnector, Transport, TransportEvent};
