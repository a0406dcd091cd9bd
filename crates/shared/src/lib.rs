//! Shared types for the roomchat client: chat models, REST payloads,
//! the STOMP frame codec and error types.

pub mod models;
pub mod protocol;
pub mod error;

pub use models::*;
pub use protocol::*;
pub use error::*;
