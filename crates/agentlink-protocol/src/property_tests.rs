//! Property-based tests for the line codec
//!
//! Checks the round-trip law `decode_line(encode_message(m)) == m` across
//! every message variant, and that arbitrary input never panics the decoder.

#[cfg(test)]
mod tests {
    use crate::codec::{decode_line, decode_request, encode, encode_message};
    use crate::content::ContentBlock;
    use crate::message::{
        AssistantMessage, ControlOutcome, ControlResponse, Message, PermissionRequest,
        ResultMessage, SystemMessage, UnknownMessage, UserContent, UserMessage,
    };
    use crate::request::{OutboundRequest, PermissionDecision};
    use crate::types::RequestId;
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    // ===== Strategy Generators =====

    fn arb_text() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 .,!?\n\"]{0,40}"
    }

    fn arb_id() -> impl Strategy<Value = String> {
        "[a-z0-9_-]{1,16}"
    }

    fn arb_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z ]{0,10}".prop_map(Value::from),
        ]
    }

    /// Non-null JSON object; `Some(null)` does not survive a round trip.
    fn arb_object() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-z]{1,6}", arb_leaf(), 0..4)
            .prop_map(|map| Value::Object(map.into_iter().collect()))
    }

    fn arb_block() -> impl Strategy<Value = ContentBlock> {
        prop_oneof![
            arb_text().prop_map(ContentBlock::text),
            (arb_text(), prop::option::of(arb_id())).prop_map(|(thinking, signature)| {
                ContentBlock::Thinking {
                    thinking,
                    signature,
                }
            }),
            (arb_id(), arb_id(), arb_object())
                .prop_map(|(id, name, input)| ContentBlock::tool_use(id, name, input)),
            (
                arb_id(),
                prop_oneof![
                    Just(Value::Null),
                    arb_text().prop_map(Value::from),
                    arb_object()
                ],
                prop::option::of(any::<bool>())
            )
                .prop_map(|(tool_use_id, content, is_error)| {
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    }
                }),
            arb_object().prop_map(|mut value| {
                if let Some(map) = value.as_object_mut() {
                    map.insert("type".into(), "image".into());
                }
                ContentBlock::Unknown(value)
            }),
        ]
    }

    fn arb_system() -> impl Strategy<Value = Message> {
        (
            "[a-z_]{1,12}",
            prop::option::of(arb_id()),
            prop::collection::btree_map("x_[a-z]{1,6}", arb_leaf(), 0..4),
        )
            .prop_map(|(subtype, session_id, data)| {
                Message::from(SystemMessage {
                    subtype,
                    session_id,
                    data: data.into_iter().collect::<Map<_, _>>(),
                })
            })
    }

    fn arb_user() -> impl Strategy<Value = Message> {
        (
            prop_oneof![
                arb_text().prop_map(UserContent::Text),
                prop::collection::vec(arb_block(), 0..4).prop_map(UserContent::Blocks),
            ],
            prop::option::of(arb_id()),
            prop::option::of(arb_id()),
        )
            .prop_map(|(content, session_id, parent_tool_use_id)| {
                Message::from(UserMessage {
                    content,
                    session_id,
                    parent_tool_use_id,
                })
            })
    }

    fn arb_assistant() -> impl Strategy<Value = Message> {
        (
            prop::collection::vec(arb_block(), 0..5),
            prop::option::of(arb_id()),
            prop::option::of(arb_id()),
            prop::option::of(arb_id()),
        )
            .prop_map(|(content, model, session_id, parent_tool_use_id)| {
                Message::from(AssistantMessage {
                    content,
                    model,
                    session_id,
                    parent_tool_use_id,
                })
            })
    }

    fn arb_result() -> impl Strategy<Value = Message> {
        (
            "[a-z_]{1,16}",
            any::<u32>(),
            any::<u32>(),
            any::<bool>(),
            any::<u32>(),
            arb_id(),
            prop::option::of(any::<f64>().prop_filter("finite", |c| c.is_finite())),
            prop::option::of(arb_object()),
            prop::option::of(arb_text()),
        )
            .prop_map(
                |(
                    subtype,
                    duration_ms,
                    duration_api_ms,
                    is_error,
                    num_turns,
                    session_id,
                    total_cost_usd,
                    usage,
                    result,
                )| {
                    Message::from(ResultMessage {
                        subtype,
                        duration_ms: u64::from(duration_ms),
                        duration_api_ms: u64::from(duration_api_ms),
                        is_error,
                        num_turns,
                        session_id,
                        total_cost_usd,
                        usage,
                        result,
                    })
                },
            )
    }

    fn arb_permission_request() -> impl Strategy<Value = Message> {
        (
            arb_id(),
            arb_id(),
            arb_object(),
            prop::option::of(arb_object()),
            prop::option::of(arb_text()),
        )
            .prop_map(
                |(request_id, tool_name, input, permission_suggestions, blocked_path)| {
                    Message::from(PermissionRequest {
                        request_id: RequestId::from_string(request_id),
                        tool_name,
                        input,
                        permission_suggestions,
                        blocked_path,
                    })
                },
            )
    }

    fn arb_control_response() -> impl Strategy<Value = Message> {
        (
            arb_id(),
            prop_oneof![
                prop::option::of(arb_object()).prop_map(ControlOutcome::Success),
                arb_text().prop_map(ControlOutcome::Error),
            ],
        )
            .prop_map(|(request_id, outcome)| {
                Message::from(ControlResponse {
                    request_id: RequestId::from_string(request_id),
                    outcome,
                })
            })
    }

    fn arb_unknown() -> impl Strategy<Value = Message> {
        ("x_[a-z]{1,8}", arb_object()).prop_map(|(message_type, mut raw)| {
            if let Some(map) = raw.as_object_mut() {
                map.insert("type".into(), Value::from(message_type.as_str()));
            }
            Message::from(UnknownMessage { message_type, raw })
        })
    }

    fn arb_message() -> impl Strategy<Value = Message> {
        prop_oneof![
            arb_system(),
            arb_user(),
            arb_assistant(),
            arb_result(),
            arb_permission_request(),
            arb_control_response(),
            arb_unknown(),
        ]
    }

    fn arb_decision() -> impl Strategy<Value = PermissionDecision> {
        prop_oneof![
            prop::option::of(arb_object())
                .prop_map(|updated_input| PermissionDecision::Allow { updated_input }),
            (arb_text(), any::<bool>())
                .prop_map(|(message, interrupt)| PermissionDecision::Deny { message, interrupt }),
        ]
    }

    // ===== Codec Properties =====

    proptest! {
        /// Property: every inbound variant survives encode then decode
        #[test]
        fn prop_message_round_trip(message in arb_message()) {
            let line = encode_message(&message).expect("encode");
            prop_assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
            prop_assert_eq!(decode_line(&line).expect("decode"), message);
        }

        /// Property: permission decisions reach the child unchanged
        #[test]
        fn prop_decision_round_trip(request_id in arb_id(), decision in arb_decision()) {
            let request = OutboundRequest::decision(RequestId::from_string(request_id), decision);
            let line = encode(&request).expect("encode");
            prop_assert_eq!(decode_request(&line).expect("decode"), request);
        }

        /// Property: arbitrary bytes never panic the decoder
        #[test]
        fn prop_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode_line(&bytes);
        }
    }
}
