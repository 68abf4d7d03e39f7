//! Interactive sessions with the agent CLI
//!
//! # Module Organization
//!
//! - [`state`] - Session lifecycle states
//! - [`core`] - [`SessionClient`] struct, connect and disconnect
//! - [`query`] - Follow-up prompts, per-turn streams and interrupts

pub mod core;
pub mod query;
pub mod state;

pub use self::core::SessionClient;
pub use self::state::SessionState;

use crate::config::AgentOptions;

/// Create an unconnected session
///
/// Nothing is spawned until [`SessionClient::connect`].
pub fn create_session(options: AgentOptions) -> SessionClient {
    SessionClient::new(options)
}
