//! Transport error types

use std::path::PathBuf;
use thiserror::Error;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur in transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    /// The executable could not be started
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        /// Program that was being launched
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The configured working directory does not exist or is not a directory
    #[error("working directory `{}` is not a directory", .0.display())]
    InvalidWorkingDirectory(PathBuf),

    /// The child exited or its stdin is closed
    #[error("broken pipe: child input is closed")]
    BrokenPipe,

    /// The stdout line stream was already handed out
    #[error("stdout line stream already taken")]
    StreamTaken,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the child never started
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::InvalidWorkingDirectory(_))
    }
}
