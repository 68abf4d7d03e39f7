//! Child-process transport for the agent CLI line protocol
//!
//! Owns the agent child process and exposes its standard streams as a
//! line-oriented channel: serialized line writes on stdin, a take-once line
//! stream on stdout, and stderr forwarded to a host sink.
//!
//! # Architecture
//!
//! - **Transport trait**: what the session layer needs from a child
//! - **Subprocess transport**: spawn, supervise and terminate a real process
//! - **Line stream**: byte lines from any async reader
//! - **Error handling**: [`TransportError`]

#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! # Usage
//!
//! ```ignore
//! use agentlink_transport::{ProcessConfig, ProcessTransport, Transport};
//!
//! let transport = ProcessTransport::spawn(ProcessConfig::new("claude").with_arg("--verbose"))?;
//! let mut lines = transport.read_lines()?;
//! transport.write_line(br#"{"type":"user",...}"#).await?;
//! while let Some(line) = lines.next_line().await? {
//!     // decode
//! }
//! ```

pub mod error;
pub mod lines;
pub mod subprocess;
pub mod traits;

// Re-export commonly used types
pub use error::{Result, TransportError};
pub use lines::LineStream;
pub use subprocess::{ProcessConfig, ProcessTransport};
pub use traits::{ProcessExit, StderrSink, Transport};
