//! Real-time room messaging over STOMP on a WebSocket.
//!
//! This module provides:
//! - A connect cycle with linear backoff and a bounded number of attempts
//! - At most one broker subscription per room, each with its own handler
//! - Publishing into a room
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                 ChatSocket                 │
//! │  (state, retry cycle, subscription table)  │
//! └────────────────────────────────────────────┘
//!            │ encoded frames    ▲ received text
//!            ▼                   │
//!     ┌──────────────────────────────────┐
//!     │     Link (from a Connector)      │
//!     │  SockJS wrap  ·  SockJS unwrap   │
//!     │   write pump  ·  read pump       │
//!     └──────────────────────────────────┘
//!                      │
//!                      ▼
//!     broker  /ws/<server>/<session>/websocket?token=...
//!             (SockJS framing; plain /ws with TransportKind::WebSocket)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let socket = ChatSocket::new(ClientConfig::from_env()?);
//! socket.connect(&token).await?;
//!
//! socket.subscribe_to_room("room1", |msg| println!("{}: {}", msg.sender, msg.content));
//! socket.send_message("room1", &NewMessage::new("alice", "yo"));
//! ```
//!
//! Subscriptions belong to the connection they were made on: after
//! `disconnect` or a lost connection, subscribe again once reconnected.

mod connection;
mod registry;
mod service;
mod sockjs;
mod transport;

#[cfg(test)]
mod mock;

pub use connection::{ConnectError, ConnectionState, ConnectionStatus};
pub use registry::{decode_message, DecodeError, MessageHandler, Subscription, SubscriptionRegistry};
pub use service::ChatSocket;
pub use sockjs::{SockJsConnector, SockJsError, SockJsFrame};
pub use transport::{Connector, Inbound, Link, TransportError, TungsteniteConnector};
