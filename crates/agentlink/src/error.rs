//! Error types for agent sessions
//!
//! Errors fall into two groups. Transport failures end the session that
//! produced them. Decode anomalies, callback failures and misuse do not.

use agentlink_protocol::{DecodeError, ProtocolError};
use agentlink_transport::TransportError;
use thiserror::Error;

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur in agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent process could not be started
    #[error("spawn error: {0}")]
    Spawn(#[source] TransportError),

    /// An inbound line could not be decoded; the stream continues
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The child exited or closed its input
    #[error("broken pipe: agent process is gone")]
    BrokenPipe,

    /// Any other transport failure
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    /// The session was closed, by the host or by a transport failure
    #[error("session is closed")]
    SessionClosed,

    /// An operation was called out of order
    #[error("usage error: {0}")]
    Usage(String),

    /// A permission callback failed
    #[error("permission callback failed: {0}")]
    PermissionCallback(String),

    /// An outbound record could not be encoded
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl AgentError {
    /// Whether this error ends the session that produced it
    pub fn closes_session(&self) -> bool {
        matches!(
            self,
            Self::Spawn(_) | Self::BrokenPipe | Self::Transport(_) | Self::SessionClosed
        )
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}

impl From<TransportError> for AgentError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::BrokenPipe => Self::BrokenPipe,
            err if err.is_spawn_failure() => Self::Spawn(err),
            err => Self::Transport(err),
        }
    }
}
