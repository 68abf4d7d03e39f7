//! Transport trait
//!
//! The session layer talks to the child only through [`Transport`], so tests
//! and embedders can swap the real subprocess for an in-memory stand-in.

use crate::error::Result;
use crate::lines::LineStream;
use async_trait::async_trait;
use std::sync::Arc;

/// Host callback receiving each stderr line of the child
pub type StderrSink = Arc<dyn Fn(String) + Send + Sync>;

/// How the child ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, absent when the child died from a signal
    pub code: Option<i32>,

    /// Whether the host had to kill the child
    pub killed: bool,
}

impl ProcessExit {
    /// Exit with a code
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            killed: false,
        }
    }

    /// Killed by the host
    pub fn killed() -> Self {
        Self {
            code: None,
            killed: true,
        }
    }

    /// Exited with code 0 on its own
    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.killed
    }
}

/// A bidirectional line channel to a child process
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one line to the child's stdin
    ///
    /// Writes are serialized; a newline is appended when missing. Fails with
    /// [`TransportError::BrokenPipe`](crate::TransportError::BrokenPipe) once
    /// the child exited or its input was closed.
    async fn write_line(&self, line: &[u8]) -> Result<()>;

    /// Take the stdout line stream; only the first call succeeds
    fn read_lines(&self) -> Result<LineStream>;

    /// Close the child's stdin, signalling end of input
    async fn close_input(&self) -> Result<()>;

    /// Stop the child and wait for it to exit
    ///
    /// Graceful termination closes stdin and waits for the grace period before
    /// killing; forced termination skips the wait. Either way the child gets
    /// SIGTERM on unix and a short window to exit before the kill.
    async fn terminate(&self, graceful: bool) -> Result<ProcessExit>;

    /// Start a graceful termination without waiting for it
    ///
    /// Safe to call from `Drop`.
    fn begin_shutdown(&self);

    /// Whether the child has not exited yet
    fn is_running(&self) -> bool {
        self.exit_status().is_none()
    }

    /// Exit status, once settled
    fn exit_status(&self) -> Option<ProcessExit>;

    /// Wait until the child exits
    async fn wait_exit(&self) -> ProcessExit;
}
