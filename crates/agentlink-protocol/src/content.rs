//! Content block types
//!
//! Typed fragments of user and assistant message payloads. Block kinds this
//! crate does not know are kept as raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A content block in a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text content.
    Text {
        /// The text content.
        text: String,
    },

    /// Extended reasoning emitted before the answer.
    Thinking {
        /// The reasoning text.
        thinking: String,
        /// Integrity signature attached by the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },

    /// A request from the model to use a tool.
    ToolUse {
        /// The unique identifier for this tool use request.
        id: String,
        /// The name of the tool to be used.
        name: String,
        /// The input to the tool, as a JSON object.
        #[serde(default)]
        input: Value,
    },

    /// The result of a tool execution.
    ToolResult {
        /// The `id` of the `tool_use` block this result is for.
        tool_use_id: String,
        /// The tool output, either a string or a list of blocks.
        ///
        /// `Null` when the child sent no content; an explicit `null` reads the same.
        #[serde(default, skip_serializing_if = "Value::is_null")]
        content: Value,
        /// Whether the tool execution resulted in an error.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },

    /// Any block kind not listed above, kept verbatim.
    #[serde(untagged)]
    Unknown(Value),
}

impl ContentBlock {
    /// Create a text content block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a tool use content block
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// Create a tool result content block
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<Value>,
        is_error: bool,
    ) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: Some(is_error),
        }
    }

    /// Get the text if this is a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Whether this block is a tool invocation
    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_block_wire_shape() {
        let block = ContentBlock::text("hi");
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"type": "text", "text": "hi"})
        );
        assert_eq!(block.as_text(), Some("hi"));
    }

    #[test]
    fn test_tool_result_string_content() {
        let block: ContentBlock = serde_json::from_value(json!({
            "type": "tool_result",
            "tool_use_id": "toolu_1",
            "content": "done",
            "is_error": false
        }))
        .unwrap();

        assert_eq!(block, ContentBlock::tool_result("toolu_1", "done", false));
    }

    #[test]
    fn test_tool_result_without_content() {
        let block: ContentBlock =
            serde_json::from_value(json!({"type": "tool_result", "tool_use_id": "t"})).unwrap();
        assert_eq!(
            block,
            ContentBlock::ToolResult {
                tool_use_id: "t".into(),
                content: Value::Null,
                is_error: None,
            }
        );
    }

    #[test]
    fn test_tool_result_null_content_reads_as_absent() {
        let explicit: ContentBlock = serde_json::from_value(
            json!({"type": "tool_result", "tool_use_id": "t", "content": null}),
        )
        .unwrap();
        let absent: ContentBlock =
            serde_json::from_value(json!({"type": "tool_result", "tool_use_id": "t"})).unwrap();
        assert_eq!(explicit, absent);

        let encoded = serde_json::to_value(&explicit).unwrap();
        assert_eq!(encoded, json!({"type": "tool_result", "tool_use_id": "t"}));
        let decoded: ContentBlock = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, explicit);
    }

    #[test]
    fn test_unknown_block_kept_verbatim() {
        let raw = json!({"type": "image", "source": {"type": "url", "url": "x"}});
        let block: ContentBlock = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(block, ContentBlock::Unknown(raw.clone()));
        assert_eq!(serde_json::to_value(&block).unwrap(), raw);
        assert!(block.as_text().is_none());
    }

    #[test]
    fn test_tool_use_input_defaults_to_null() {
        let block: ContentBlock =
            serde_json::from_value(json!({"type": "tool_use", "id": "1", "name": "Bash"})).unwrap();
        assert!(block.is_tool_use());
    }
}
