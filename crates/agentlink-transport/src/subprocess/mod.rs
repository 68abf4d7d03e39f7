//! Subprocess transport for the agent CLI
//!
//! Spawns the CLI with piped standard streams and supervises it until exit.

pub mod process;
mod supervisor;

pub use process::{ProcessConfig, ProcessTransport};
