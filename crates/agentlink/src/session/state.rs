//! Session lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a [`SessionClient`](super::SessionClient) is in its lifecycle
///
/// ```text
/// Unconnected -> Connecting -> Connected -> Draining -> Closed
/// ```
///
/// Any state moves straight to `Closed` on a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, no process yet
    #[default]
    Unconnected,
    /// Process started, nothing received yet
    Connecting,
    /// The child has produced at least one message
    Connected,
    /// Shutting down, in-flight messages still being drained
    Draining,
    /// Terminal
    Closed,
}

impl SessionState {
    /// Whether requests can still be written
    pub fn is_open(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconnected => "unconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Draining => "draining",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
