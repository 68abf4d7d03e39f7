//! Inbound message types
//!
//! Every line the agent CLI writes to stdout decodes into one [`Message`].
//! Record kinds this crate does not know decode into [`Message::Unknown`]
//! so newer CLI versions never break an older host.

use crate::content::ContentBlock;
use crate::types::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A decoded inbound record
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Session metadata (init, status, compaction boundaries)
    System(SystemMessage),

    /// Echoed user input, mostly tool results
    User(UserMessage),

    /// Model output for the current turn
    Assistant(AssistantMessage),

    /// Terminal record of a turn
    Result(ResultMessage),

    /// Tool-use approval request that must be answered with a decision
    PermissionRequest(PermissionRequest),

    /// Acknowledgement of a control request sent by the host
    ControlResponse(ControlResponse),

    /// Any record kind not listed above
    Unknown(UnknownMessage),
}

impl Message {
    /// The wire discriminant of this record
    pub fn message_type(&self) -> &str {
        match self {
            Self::System(_) => "system",
            Self::User(_) => "user",
            Self::Assistant(_) => "assistant",
            Self::Result(_) => "result",
            Self::PermissionRequest(_) => "control_request",
            Self::ControlResponse(_) => "control_response",
            Self::Unknown(m) => &m.message_type,
        }
    }

    /// Session id assigned by the child, when the record carries one
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::System(m) => m.session_id.as_deref(),
            Self::User(m) => m.session_id.as_deref(),
            Self::Assistant(m) => m.session_id.as_deref(),
            Self::Result(m) => Some(&m.session_id),
            Self::Unknown(m) => m.raw.get("session_id").and_then(Value::as_str),
            Self::PermissionRequest(_) | Self::ControlResponse(_) => None,
        }
    }

    /// Whether this record ends a turn
    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }

    /// Get the result record, if this is one
    pub fn as_result(&self) -> Option<&ResultMessage> {
        match self {
            Self::Result(m) => Some(m),
            _ => None,
        }
    }

    /// Get the assistant record, if this is one
    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Assistant(m) => Some(m),
            _ => None,
        }
    }

    /// Content blocks of user and assistant records
    pub fn content_blocks(&self) -> &[ContentBlock] {
        match self {
            Self::User(m) => m.content.blocks(),
            Self::Assistant(m) => &m.content,
            _ => &[],
        }
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Message {
                fn from(message: $ty) -> Self {
                    Self::$variant(message)
                }
            }
        )*
    };
}

impl_from_variant! {
    System => SystemMessage,
    User => UserMessage,
    Assistant => AssistantMessage,
    Result => ResultMessage,
    PermissionRequest => PermissionRequest,
    ControlResponse => ControlResponse,
    Unknown => UnknownMessage,
}

/// Session metadata emitted by the child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    /// Kind of system record (`init`, `compact_boundary`, ...)
    pub subtype: String,

    /// Session id, present on `init`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Every other field, kept verbatim
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl SystemMessage {
    /// Create a system record with no extra data
    pub fn new(subtype: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            subtype: subtype.into(),
            session_id,
            data: Map::new(),
        }
    }
}

/// Payload of a user record: a plain string or a list of blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    /// Plain text prompt
    Text(String),

    /// Structured blocks, usually tool results
    Blocks(Vec<ContentBlock>),
}

impl UserContent {
    /// The blocks, empty when the content is plain text
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            Self::Text(_) => &[],
            Self::Blocks(blocks) => blocks,
        }
    }

    /// The text, when the content is plain text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Blocks(_) => None,
        }
    }
}

/// A user record echoed by the child
#[derive(Debug, Clone, PartialEq)]
pub struct UserMessage {
    /// Message payload
    pub content: UserContent,

    /// Session id
    pub session_id: Option<String>,

    /// Tool use this record answers, for subagent traffic
    pub parent_tool_use_id: Option<String>,
}

/// Model output
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantMessage {
    /// Ordered content blocks
    pub content: Vec<ContentBlock>,

    /// Model that produced the output
    pub model: Option<String>,

    /// Session id
    pub session_id: Option<String>,

    /// Tool use this record belongs to, for subagent traffic
    pub parent_tool_use_id: Option<String>,
}

impl AssistantMessage {
    /// Create an assistant record from blocks
    pub fn new(content: Vec<ContentBlock>, session_id: Option<String>) -> Self {
        Self {
            content,
            model: None,
            session_id,
            parent_tool_use_id: None,
        }
    }

    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.content.iter().filter_map(ContentBlock::as_text).collect()
    }

    /// Tool invocations in this record
    pub fn tool_uses(&self) -> impl Iterator<Item = &ContentBlock> {
        self.content.iter().filter(|block| block.is_tool_use())
    }
}

/// Terminal record of a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    /// `success` or an error subtype such as `error_max_turns`
    pub subtype: String,

    /// Wall-clock duration of the turn
    #[serde(default)]
    pub duration_ms: u64,

    /// Time spent waiting on the model API
    #[serde(default)]
    pub duration_api_ms: u64,

    /// Whether the turn ended in error
    #[serde(default)]
    pub is_error: bool,

    /// Turns taken so far in this session
    #[serde(default)]
    pub num_turns: u32,

    /// Session id
    pub session_id: String,

    /// Accumulated cost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,

    /// Token usage, opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,

    /// Final answer text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ResultMessage {
    /// Create a successful result record
    pub fn new(session_id: impl Into<String>, num_turns: u32) -> Self {
        Self {
            subtype: "success".to_string(),
            duration_ms: 0,
            duration_api_ms: 0,
            is_error: false,
            num_turns,
            session_id: session_id.into(),
            total_cost_usd: None,
            usage: None,
            result: None,
        }
    }

    /// Set the final answer text
    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    /// Set the accumulated cost
    pub fn with_cost(mut self, total_cost_usd: f64) -> Self {
        self.total_cost_usd = Some(total_cost_usd);
        self
    }

    /// Set both durations
    pub fn with_duration(mut self, duration_ms: u64, duration_api_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self.duration_api_ms = duration_api_ms;
        self
    }

    /// Mark the turn as failed with the given subtype
    pub fn with_error(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = subtype.into();
        self.is_error = true;
        self
    }
}

/// A `can_use_tool` control request
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionRequest {
    /// Correlation id the decision must echo
    pub request_id: RequestId,

    /// Tool the agent wants to run
    pub tool_name: String,

    /// Tool input as proposed by the agent
    pub input: Value,

    /// Permission updates the CLI suggests, opaque
    pub permission_suggestions: Option<Value>,

    /// Path that triggered the request, for file tools
    pub blocked_path: Option<String>,
}

impl PermissionRequest {
    /// Create a request with no suggestions
    pub fn new(request_id: RequestId, tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            request_id,
            tool_name: tool_name.into(),
            input,
            permission_suggestions: None,
            blocked_path: None,
        }
    }
}

/// Acknowledgement of a host control request
#[derive(Debug, Clone, PartialEq)]
pub struct ControlResponse {
    /// Id of the request being answered
    pub request_id: RequestId,

    /// What happened
    pub outcome: ControlOutcome,
}

/// Outcome carried by a [`ControlResponse`]
#[derive(Debug, Clone, PartialEq)]
pub enum ControlOutcome {
    /// The request succeeded, with an optional payload
    Success(Option<Value>),

    /// The request failed
    Error(String),
}

/// A record with an unrecognised discriminant
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownMessage {
    /// The discriminant as sent
    pub message_type: String,

    /// The whole record
    pub raw: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assistant_text_concatenates_text_blocks() {
        let message = AssistantMessage::new(
            vec![
                ContentBlock::text("Hello"),
                ContentBlock::tool_use("t1", "Bash", json!({"command": "ls"})),
                ContentBlock::text(", world"),
            ],
            Some("s".into()),
        );

        assert_eq!(message.text(), "Hello, world");
        assert_eq!(message.tool_uses().count(), 1);
    }

    #[test]
    fn test_message_accessors() {
        let result = Message::from(ResultMessage::new("sess", 2).with_result("ok"));
        assert_eq!(result.message_type(), "result");
        assert_eq!(result.session_id(), Some("sess"));
        assert!(result.is_result());
        assert_eq!(result.as_result().unwrap().num_turns, 2);

        let unknown = Message::from(UnknownMessage {
            message_type: "stream_event".into(),
            raw: json!({"type": "stream_event", "session_id": "x"}),
        });
        assert_eq!(unknown.message_type(), "stream_event");
        assert_eq!(unknown.session_id(), Some("x"));
    }

    #[test]
    fn test_user_text_content_has_no_blocks() {
        let message = Message::from(UserMessage {
            content: UserContent::Text("hi".into()),
            session_id: None,
            parent_tool_use_id: None,
        });
        assert!(message.content_blocks().is_empty());
    }

    #[test]
    fn test_result_builder() {
        let result = ResultMessage::new("s", 1)
            .with_cost(0.25)
            .with_duration(1200, 900)
            .with_error("error_max_turns");

        assert!(result.is_error);
        assert_eq!(result.subtype, "error_max_turns");
        assert_eq!(result.total_cost_usd, Some(0.25));
        assert_eq!(result.duration_api_ms, 900);
    }
}
