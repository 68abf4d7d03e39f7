//! Error types for protocol operations

use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur while encoding outbound records
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record that cannot be expressed on the wire
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// An inbound line that could not be classified
///
/// Carries the raw line so callers can log or surface it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decode line ({reason}): {line}")]
pub struct DecodeError {
    /// The offending line, lossily converted to UTF-8
    pub line: String,

    /// Why the line was rejected
    pub reason: String,
}

impl DecodeError {
    /// Create a decode error for a raw line
    pub fn new(line: &[u8], reason: impl Into<String>) -> Self {
        let line = String::from_utf8_lossy(line);
        Self {
            line: line.trim_end_matches(['\r', '\n']).to_string(),
            reason: reason.into(),
        }
    }
}
