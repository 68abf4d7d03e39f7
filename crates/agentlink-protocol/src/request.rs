//! Outbound request types
//!
//! Records the host writes to the child's stdin.

use crate::types::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Session id sent before the child has assigned one
pub const DEFAULT_SESSION_ID: &str = "default";

/// A record written to the child
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundRequest {
    /// Initial prompt or follow-up query
    UserPrompt {
        /// Prompt text
        text: String,
        /// Session the prompt belongs to
        session_id: String,
    },

    /// Answer to a `can_use_tool` request
    PermissionDecision {
        /// Id of the request being answered
        request_id: RequestId,
        /// The decision
        decision: PermissionDecision,
    },

    /// Ask the child to stop the current turn
    Interrupt {
        /// Correlation id for the acknowledgement
        request_id: RequestId,
    },
}

impl OutboundRequest {
    /// A prompt for the given session, or the default session when none is known yet
    pub fn user_prompt(text: impl Into<String>, session_id: Option<&str>) -> Self {
        Self::UserPrompt {
            text: text.into(),
            session_id: session_id.unwrap_or(DEFAULT_SESSION_ID).to_string(),
        }
    }

    /// A decision for the given request
    pub fn decision(request_id: RequestId, decision: PermissionDecision) -> Self {
        Self::PermissionDecision {
            request_id,
            decision,
        }
    }

    /// An interrupt with a fresh request id
    pub fn interrupt() -> Self {
        Self::Interrupt {
            request_id: RequestId::new(),
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserPrompt { .. } => "user_prompt",
            Self::PermissionDecision { .. } => "permission_decision",
            Self::Interrupt { .. } => "interrupt",
        }
    }
}

/// Answer to a tool-use approval request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "snake_case")]
pub enum PermissionDecision {
    /// Let the tool run
    Allow {
        /// Input to run the tool with, replacing the proposed one
        #[serde(
            rename = "updatedInput",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        updated_input: Option<Value>,
    },

    /// Refuse the tool
    Deny {
        /// Reason shown to the agent
        message: String,
        /// Whether the agent should also stop the turn
        #[serde(default)]
        interrupt: bool,
    },
}

impl PermissionDecision {
    /// Allow with the proposed input
    pub fn allow() -> Self {
        Self::Allow {
            updated_input: None,
        }
    }

    /// Allow with a rewritten input
    pub fn allow_with_input(input: Value) -> Self {
        Self::Allow {
            updated_input: Some(input),
        }
    }

    /// Deny with a reason
    pub fn deny(message: impl Into<String>) -> Self {
        Self::Deny {
            message: message.into(),
            interrupt: false,
        }
    }

    /// Deny and stop the turn
    pub fn deny_and_interrupt(message: impl Into<String>) -> Self {
        Self::Deny {
            message: message.into(),
            interrupt: true,
        }
    }

    /// Whether the tool may run
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// Fill a missing `updatedInput` with the proposed input
    ///
    /// The CLI requires an input object on every allow.
    pub fn with_default_input(self, proposed: &Value) -> Self {
        match self {
            Self::Allow {
                updated_input: None,
            } => Self::Allow {
                updated_input: Some(proposed.clone()),
            },
            other => other,
        }
    }
}
