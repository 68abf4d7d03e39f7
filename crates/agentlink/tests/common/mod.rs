//! Scripted agent children shared by the integration tests

#![allow(dead_code)]

use agentlink::testing::{StubChild, StubTransport};
use agentlink_protocol::{
    AssistantMessage, ContentBlock, OutboundRequest, PermissionDecision, PermissionRequest,
    RequestId, ResultMessage, SystemMessage, UserContent, UserMessage,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

pub const SESSION_ID: &str = "sess-1";

/// Answer arithmetic prompts, one turn per prompt, until stdin closes
pub fn calculator() -> Arc<StubTransport> {
    Arc::new(StubTransport::spawn(|mut child| async move {
        let mut turns = 0;
        while let Ok(Some(request)) = child.next_request().await {
            let OutboundRequest::UserPrompt { text, .. } = request else {
                continue;
            };
            if turns == 0 {
                let _ = child
                    .emit(SystemMessage::new("init", Some(SESSION_ID.into())))
                    .await;
            }
            turns += 1;
            let _ = child.emit(assistant_text(answer(&text))).await;
            let _ = child
                .emit(ResultMessage::new(SESSION_ID, turns).with_result(answer(&text)))
                .await;
        }
    }))
}

/// Emit the init record for every prompt but never finish the turn
pub fn stalled() -> Arc<StubTransport> {
    Arc::new(StubTransport::spawn(|mut child| async move {
        while let Ok(Some(request)) = child.next_request().await {
            if let OutboundRequest::UserPrompt { .. } = request {
                let _ = child
                    .emit(SystemMessage::new("init", Some(SESSION_ID.into())))
                    .await;
            }
        }
    }))
}

/// Ignore stdin closure; only a kill stops this child
pub fn stubborn(grace_period: Duration) -> Arc<StubTransport> {
    Arc::new(StubTransport::spawn_with_grace(grace_period, |mut child| async move {
        let _ = child.next_request().await;
        let _ = child.emit(assistant_text("thinking...")).await;
        std::future::pending::<()>().await;
    }))
}

/// Ask permission to write a file for every prompt, run it only when allowed
///
/// Returns the transport, the decisions the child received and a counter of
/// tool executions. Each turn sends `requests_per_turn` copies of the same
/// permission request.
pub fn tool_agent(
    requests_per_turn: usize,
) -> (
    Arc<StubTransport>,
    mpsc::UnboundedReceiver<(RequestId, PermissionDecision)>,
    Arc<AtomicUsize>,
) {
    let (decisions_tx, decisions_rx) = mpsc::unbounded_channel();
    let tool_runs = Arc::new(AtomicUsize::new(0));
    let runs = Arc::clone(&tool_runs);

    let transport = StubTransport::spawn(move |mut child| async move {
        let mut turns = 0;
        while let Ok(Some(request)) = child.next_request().await {
            let OutboundRequest::UserPrompt { .. } = request else {
                continue;
            };
            turns += 1;
            let request_id = RequestId::from(format!("perm-{turns}").as_str());
            let input = json!({"file_path": "/tmp/notes.txt", "content": "hello"});
            for _ in 0..requests_per_turn {
                let _ = child
                    .emit(PermissionRequest::new(request_id.clone(), "Write", input.clone()))
                    .await;
            }

            let decision = loop {
                match child.next_request().await {
                    Ok(Some(OutboundRequest::PermissionDecision { request_id, decision })) => {
                        let _ = decisions_tx.send((request_id, decision.clone()));
                        break Some(decision);
                    }
                    Ok(Some(_)) => continue,
                    _ => break None,
                }
            };
            let Some(decision) = decision else {
                return;
            };

            let reply = match decision {
                PermissionDecision::Allow { .. } => {
                    runs.fetch_add(1, Ordering::SeqCst);
                    let _ = child
                        .emit(AssistantMessage::new(
                            vec![ContentBlock::tool_use("tool-1", "Write", input.clone())],
                            Some(SESSION_ID.into()),
                        ))
                        .await;
                    let _ = child
                        .emit(UserMessage {
                            content: UserContent::Blocks(vec![ContentBlock::tool_result(
                                "tool-1",
                                "wrote 5 bytes",
                                false,
                            )]),
                            session_id: Some(SESSION_ID.into()),
                            parent_tool_use_id: None,
                        })
                        .await;
                    "file written".to_string()
                }
                PermissionDecision::Deny { message, .. } => format!("not allowed: {message}"),
            };
            let _ = child.emit(assistant_text(&reply)).await;
            let _ = child.emit(ResultMessage::new(SESSION_ID, turns)).await;
        }
    });

    (Arc::new(transport), decisions_rx, tool_runs)
}

/// Run a custom script
pub fn scripted<F, Fut>(script: F) -> Arc<StubTransport>
where
    F: FnOnce(StubChild) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(StubTransport::spawn(script))
}

pub fn assistant_text(text: &str) -> AssistantMessage {
    AssistantMessage::new(vec![ContentBlock::text(text)], Some(SESSION_ID.into()))
}

fn answer(prompt: &str) -> &'static str {
    if prompt.contains("2+2") {
        "4"
    } else if prompt.contains("3+3") {
        "6"
    } else {
        "I can only add small numbers"
    }
}

/// Whether the transport exits within `within`
pub async fn wait_stopped(transport: &StubTransport, within: Duration) -> bool {
    use agentlink::Transport;
    tokio::time::timeout(within, transport.wait_exit()).await.is_ok()
}
