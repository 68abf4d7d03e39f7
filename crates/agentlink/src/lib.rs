//! Session protocol engine for an agent CLI child process
//!
//! Drives the agent CLI over its stream-json protocol: spawns the process,
//! writes prompts and permission decisions to stdin, and turns stdout into a
//! typed message stream.
//!
//! # Key Features
//!
//! - **One-shot queries**: [`query`] and [`query_text`] run a single turn and stop the process
//! - **Interactive sessions**: [`SessionClient`] keeps one process across turns
//! - **Permission brokering**: tool-use requests are answered by a host callback or the mode's policy
//! - **Scoped cleanup**: dropping a stream or session stops the child
//!
//! # Architecture
//!
//! 1. **Protocol Layer** (`agentlink-protocol`): wire types and line codec
//! 2. **Transport Layer** (`agentlink-transport`): subprocess and line I/O
//! 3. **Session Layer** (this crate): routing, permissions, queries and sessions
//!
//! # Usage Example
//!
//! ```no_run
//! use agentlink::{AgentOptions, query_text};
//!
//! #[tokio::main]
//! async fn main() -> agentlink::Result<()> {
//!     let answer = query_text("What is 2+2?", AgentOptions::from_env()?).await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod outbound;
pub mod permissions;
pub mod query;
pub mod routing;
pub mod session;
pub mod testing;

// Re-export commonly used types
pub use config::{AgentOptions, DecodePolicy};
pub use error::{AgentError, Result};
pub use lifecycle::ShutdownGuard;
pub use permissions::{PermissionBroker, PermissionCallback, permission_callback};
pub use query::{QueryStream, query, query_text, query_with_transport};
pub use routing::{MessageRouter, MessageSink, OneShotCollector, RouterExit, SubscriberQueue};
pub use session::{SessionClient, SessionState, create_session};

pub use agentlink_protocol::{
    AssistantMessage, ContentBlock, Message, PermissionDecision, PermissionMode,
    PermissionRequest, ResultMessage, SystemMessage, UserMessage,
};
pub use agentlink_transport::{ProcessExit, StderrSink, Transport};
