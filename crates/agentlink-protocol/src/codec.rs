//! Line codec for the stream-json protocol
//!
//! One JSON object per line in both directions. Inbound records are
//! classified by their `type` field; control requests are further classified
//! by `request.subtype`.
//!
//! ```text
//! host  -> child   {"type":"user","message":{"role":"user","content":"..."},...}
//! child -> host    {"type":"assistant","message":{"content":[...]},"session_id":"..."}
//! child -> host    {"type":"control_request","request_id":"...","request":{"subtype":"can_use_tool",...}}
//! host  -> child   {"type":"control_response","response":{"subtype":"success","request_id":"...","response":{"behavior":"allow",...}}}
//! child -> host    {"type":"result","subtype":"success","session_id":"...","num_turns":1,...}
//! ```

use crate::content::ContentBlock;
use crate::error::{DecodeError, ProtocolError, Result};
use crate::message::{
    AssistantMessage, ControlOutcome, ControlResponse, Message, PermissionRequest, UnknownMessage,
    UserContent, UserMessage,
};
use crate::request::{OutboundRequest, PermissionDecision};
use crate::types::RequestId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

const CAN_USE_TOOL: &str = "can_use_tool";
const INTERRUPT: &str = "interrupt";

/// `{"message": {...}, "session_id": ..., "parent_tool_use_id": ...}`
#[derive(Serialize, Deserialize)]
struct ChatEnvelope<C> {
    message: ChatBody<C>,
    #[serde(default)]
    parent_tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ChatBody<C> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    content: C,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ControlRequestEnvelope {
    request_id: RequestId,
    request: Value,
}

#[derive(Serialize, Deserialize)]
struct CanUseTool {
    tool_name: String,
    #[serde(default)]
    input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    permission_suggestions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    blocked_path: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ControlResponseEnvelope {
    response: ControlResponseBody,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
enum ControlResponseBody {
    Success {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<Value>,
    },
    Error {
        request_id: RequestId,
        error: String,
    },
}

/// Encode an outbound request as one newline-terminated line
pub fn encode(request: &OutboundRequest) -> Result<Vec<u8>> {
    let value = match request {
        OutboundRequest::UserPrompt { text, session_id } => tagged(
            "type",
            "user",
            &ChatEnvelope {
                message: ChatBody {
                    role: Some("user".to_string()),
                    content: text,
                    model: None,
                },
                parent_tool_use_id: None,
                session_id: Some(session_id.clone()),
            },
        )?,
        OutboundRequest::PermissionDecision {
            request_id,
            decision,
        } => tagged(
            "type",
            "control_response",
            &ControlResponseEnvelope {
                response: ControlResponseBody::Success {
                    request_id: request_id.clone(),
                    response: Some(serde_json::to_value(decision)?),
                },
            },
        )?,
        OutboundRequest::Interrupt { request_id } => tagged(
            "type",
            "control_request",
            &ControlRequestEnvelope {
                request_id: request_id.clone(),
                request: json!({ "subtype": INTERRUPT }),
            },
        )?,
    };

    to_line(&value)
}

/// Encode an inbound message as the child would write it
///
/// Used by simulated children and by round-trip checks.
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    let value = match message {
        Message::System(m) => tagged("type", "system", m)?,
        Message::User(m) => tagged(
            "type",
            "user",
            &ChatEnvelope {
                message: ChatBody {
                    role: Some("user".to_string()),
                    content: &m.content,
                    model: None,
                },
                parent_tool_use_id: m.parent_tool_use_id.clone(),
                session_id: m.session_id.clone(),
            },
        )?,
        Message::Assistant(m) => tagged(
            "type",
            "assistant",
            &ChatEnvelope {
                message: ChatBody {
                    role: Some("assistant".to_string()),
                    content: &m.content,
                    model: m.model.clone(),
                },
                parent_tool_use_id: m.parent_tool_use_id.clone(),
                session_id: m.session_id.clone(),
            },
        )?,
        Message::Result(m) => tagged("type", "result", m)?,
        Message::PermissionRequest(r) => tagged(
            "type",
            "control_request",
            &ControlRequestEnvelope {
                request_id: r.request_id.clone(),
                request: tagged(
                    "subtype",
                    CAN_USE_TOOL,
                    &CanUseTool {
                        tool_name: r.tool_name.clone(),
                        input: r.input.clone(),
                        permission_suggestions: r.permission_suggestions.clone(),
                        blocked_path: r.blocked_path.clone(),
                    },
                )?,
            },
        )?,
        Message::ControlResponse(r) => {
            let body = match &r.outcome {
                ControlOutcome::Success(response) => ControlResponseBody::Success {
                    request_id: r.request_id.clone(),
                    response: response.clone(),
                },
                ControlOutcome::Error(error) => ControlResponseBody::Error {
                    request_id: r.request_id.clone(),
                    error: error.clone(),
                },
            };
            tagged(
                "type",
                "control_response",
                &ControlResponseEnvelope { response: body },
            )?
        }
        Message::Unknown(m) => m.raw.clone(),
    };

    to_line(&value)
}

/// Decode one inbound line
///
/// Unrecognised discriminants yield [`Message::Unknown`]. Lines that are not
/// a JSON object with a string `type`, or whose shape does not match their
/// declared type, yield a [`DecodeError`] carrying the raw line.
pub fn decode_line(line: &[u8]) -> std::result::Result<Message, DecodeError> {
    let (message_type, map) = split_record(line)?;
    classify(&message_type, map).map_err(|reason| DecodeError::new(line, reason))
}

/// Decode one outbound line, as a simulated child reads it
pub fn decode_request(line: &[u8]) -> std::result::Result<OutboundRequest, DecodeError> {
    let (message_type, map) = split_record(line)?;
    classify_request(&message_type, map).map_err(|reason| DecodeError::new(line, reason))
}

fn classify(message_type: &str, map: Map<String, Value>) -> std::result::Result<Message, String> {
    let message = match message_type {
        "system" => Message::System(from_map(map)?),
        "result" => Message::Result(from_map(map)?),
        "user" => {
            let envelope: ChatEnvelope<UserContent> = from_map(map)?;
            Message::User(UserMessage {
                content: envelope.message.content,
                session_id: envelope.session_id,
                parent_tool_use_id: envelope.parent_tool_use_id,
            })
        }
        "assistant" => {
            let envelope: ChatEnvelope<Vec<ContentBlock>> = from_map(map)?;
            Message::Assistant(AssistantMessage {
                content: envelope.message.content,
                model: envelope.message.model,
                session_id: envelope.session_id,
                parent_tool_use_id: envelope.parent_tool_use_id,
            })
        }
        "control_request" if request_subtype(&map) == Some(CAN_USE_TOOL) => {
            let envelope: ControlRequestEnvelope = from_map(map)?;
            let body: CanUseTool =
                serde_json::from_value(envelope.request).map_err(|e| e.to_string())?;
            Message::PermissionRequest(PermissionRequest {
                request_id: envelope.request_id,
                tool_name: body.tool_name,
                input: body.input,
                permission_suggestions: body.permission_suggestions,
                blocked_path: body.blocked_path,
            })
        }
        "control_response" => {
            let envelope: ControlResponseEnvelope = from_map(map)?;
            Message::ControlResponse(match envelope.response {
                ControlResponseBody::Success {
                    request_id,
                    response,
                } => ControlResponse {
                    request_id,
                    outcome: ControlOutcome::Success(response),
                },
                ControlResponseBody::Error { request_id, error } => ControlResponse {
                    request_id,
                    outcome: ControlOutcome::Error(error),
                },
            })
        }
        other => Message::Unknown(UnknownMessage {
            message_type: other.to_string(),
            raw: Value::Object(map),
        }),
    };

    Ok(message)
}

fn classify_request(
    message_type: &str,
    map: Map<String, Value>,
) -> std::result::Result<OutboundRequest, String> {
    match message_type {
        "user" => {
            let envelope: ChatEnvelope<UserContent> = from_map(map)?;
            match envelope.message.content {
                UserContent::Text(text) => Ok(OutboundRequest::user_prompt(
                    text,
                    envelope.session_id.as_deref(),
                )),
                UserContent::Blocks(_) => Err("prompt content is not plain text".to_string()),
            }
        }
        "control_request" if request_subtype(&map) == Some(INTERRUPT) => {
            let envelope: ControlRequestEnvelope = from_map(map)?;
            Ok(OutboundRequest::Interrupt {
                request_id: envelope.request_id,
            })
        }
        "control_response" => {
            let envelope: ControlResponseEnvelope = from_map(map)?;
            match envelope.response {
                ControlResponseBody::Success {
                    request_id,
                    response: Some(response),
                } => {
                    let decision: PermissionDecision =
                        serde_json::from_value(response).map_err(|e| e.to_string())?;
                    Ok(OutboundRequest::PermissionDecision {
                        request_id,
                        decision,
                    })
                }
                _ => Err("control response carries no permission decision".to_string()),
            }
        }
        other => Err(format!("`{other}` is not an outbound request")),
    }
}

fn split_record(line: &[u8]) -> std::result::Result<(String, Map<String, Value>), DecodeError> {
    let value: Value =
        serde_json::from_slice(line).map_err(|e| DecodeError::new(line, e.to_string()))?;

    let Value::Object(map) = value else {
        return Err(DecodeError::new(line, "record is not a JSON object"));
    };

    match map.get("type") {
        Some(Value::String(message_type)) => Ok((message_type.clone(), map)),
        _ => Err(DecodeError::new(line, "missing string `type` field")),
    }
}

fn request_subtype(map: &Map<String, Value>) -> Option<&str> {
    map.get("request")?.get("subtype")?.as_str()
}

fn from_map<T: DeserializeOwned>(mut map: Map<String, Value>) -> std::result::Result<T, String> {
    map.remove("type");
    serde_json::from_value(Value::Object(map)).map_err(|e| e.to_string())
}

fn tagged<T: Serialize>(key: &str, tag: &str, body: &T) -> Result<Value> {
    let mut value = serde_json::to_value(body)?;
    match value.as_object_mut() {
        Some(map) => {
            map.insert(key.to_string(), Value::String(tag.to_string()));
            Ok(value)
        }
        None => Err(ProtocolError::InvalidMessage(format!(
            "{tag} record does not serialize to an object"
        ))),
    }
}

fn to_line(value: &Value) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}
