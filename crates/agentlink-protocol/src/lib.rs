//! Wire types and line codec for the agent CLI stream-json protocol
//!
//! The agent CLI speaks newline-delimited JSON over its standard streams. Every
//! record names its variant through a `type` field. This crate holds the typed
//! view of those records and the codec that moves between bytes and types.
//!
//! # Type Organization
//!
//! - **Content types**: [`content`] - Text, thinking, tool use/results
//! - **Message types**: [`message`] - Inbound records (system, user, assistant, result, control)
//! - **Requests**: [`request`] - Outbound records (prompts, permission decisions, interrupts)
//! - **Common types**: [`types`] - Request ids, permission modes
//! - **Codec**: [`codec`] - `encode` / `decode_line`
//! - **Error types**: [`error`] - Encoding and decoding errors
//!
//! All types are pure data. No I/O happens in this crate.

#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! # Usage
//!
//! ```
//! use agentlink_protocol::{decode_line, Message};
//!
//! let line = br#"{"type":"assistant","message":{"content":[{"type":"text","text":"4"}]},"session_id":"s1"}"#;
//! let message = decode_line(line).unwrap();
//! assert_eq!(message.session_id(), Some("s1"));
//! assert!(matches!(message, Message::Assistant(_)));
//! ```

pub mod codec;
pub mod content;
pub mod error;
pub mod message;
pub mod request;
pub mod types;

#[cfg(test)]
mod property_tests;

// Re-export commonly used types at crate level
pub use codec::{decode_line, decode_request, encode, encode_message};
pub use content::ContentBlock;
pub use error::{DecodeError, ProtocolError, Result};
pub use message::{
    AssistantMessage, ControlOutcome, ControlResponse, Message, PermissionRequest, ResultMessage,
    SystemMessage, UnknownMessage, UserContent, UserMessage,
};
pub use request::{DEFAULT_SESSION_ID, OutboundRequest, PermissionDecision};
pub use types::{PermissionMode, RequestId};
