//! Roomchat Client
//!
//! Client library for the roomchat backend: REST calls for accounts and
//! rooms, a persisted session, and real-time room messaging over STOMP.

pub mod api_client;
pub mod auth;
pub mod config;
pub mod logging;
pub mod rooms;
pub mod session;
pub mod storage;
pub mod ws;

pub use api_client::ApiClient;
pub use auth::AuthService;
pub use config::{ClientConfig, ConfigError, RetryPolicy, TransportKind};
pub use rooms::RoomService;
pub use session::{Session, SessionStore};
pub use storage::{Storage, StorageError};
pub use ws::{ChatSocket, ConnectError, ConnectionState};
