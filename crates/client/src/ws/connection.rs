//! Connection state and connect errors.

use crate::config::ConfigError;

use super::transport::TransportError;

/// Connection state for the broker socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// A connect cycle is waiting to retry after `attempt` failures.
    Reconnecting { attempt: u32 },
    Connected,
    /// The last connect cycle gave up.
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Snapshot of the connection and its retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub attempts: u32,
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("broker rejected the connection: {0}")]
    Protocol(String),
    #[error("invalid broker endpoint: {0}")]
    Endpoint(#[from] ConfigError),
    #[error("failed to connect after {attempts} attempts: {last}")]
    MaxRetriesExceeded { attempts: u32, last: String },
    #[error("connect cancelled by disconnect")]
    Cancelled,
}

impl ConnectError {
    /// Whether the retry policy applies to this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectError::Transport(_) | ConnectError::Protocol(_))
    }
}
