//! Five walkthroughs of the agentlink API against a real agent CLI
//!
//! 1. One-shot query, printed as it streams
//! 2. `query_text` with model, turn limit and permission mode
//! 3. An interactive session with a follow-up turn
//! 4. Watching tool use and tool results
//! 5. A permission callback that refuses file writes
//!
//! The CLI is found through `AGENTLINK_CLI_PATH` (default `claude`).
//!
//! Run with: RUST_LOG=agentlink=debug cargo run --example samples

use agentlink::{
    AgentOptions, ContentBlock, Message, PermissionDecision, PermissionMode, create_session,
    permission_callback, query, query_text,
};
use futures::StreamExt;
use std::io::Write;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let base = AgentOptions::from_env()?;

    println!("=== Example 1: Simple Query ===");
    let mut stream = query("What is 2 + 2?", base.clone()).await?;
    while let Some(message) = stream.next().await {
        match message? {
            Message::Assistant(assistant) => print_flush(&assistant.text()),
            Message::Result(result) => {
                println!();
                println!(
                    "[Session: {}, Turns: {}]",
                    result.session_id, result.num_turns
                );
            }
            _ => {}
        }
    }

    println!("\n=== Example 2: Query with Options ===");
    let options = base
        .clone()
        .with_model("claude-sonnet-4-20250514")
        .with_max_turns(3)
        .with_permission_mode(PermissionMode::AcceptEdits);
    let text = query_text("Explain async/await in Rust in one sentence", options).await?;
    println!("{text}");

    println!("\n=== Example 3: Interactive Session ===");
    let mut session = create_session(base.clone());
    session.connect("Hello! Remember my name is Alice.").await?;
    print_turn(session.receive_response()).await?;

    session.query("What's my name?").await?;
    print_turn(session.receive_response()).await?;
    session.disconnect().await?;

    println!("\n=== Example 4: Tool Use ===");
    let mut stream = query("What files are in the current directory?", base.clone()).await?;
    while let Some(message) = stream.next().await {
        match message? {
            Message::Assistant(assistant) => {
                for block in &assistant.content {
                    match block {
                        ContentBlock::Text { text } => println!("[Text] {text}"),
                        ContentBlock::ToolUse { id, name, .. } => println!("[Tool] {name}: {id}"),
                        _ => {}
                    }
                }
            }
            Message::User(user) => {
                for block in user.content.blocks() {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        is_error,
                        ..
                    } = block
                    {
                        let outcome = if *is_error == Some(true) { "Error" } else { "Success" };
                        println!("[Result] Tool {tool_use_id}: {outcome}");
                    }
                }
            }
            _ => {}
        }
    }

    println!("\n=== Example 5: Custom Permission Callback ===");
    let guarded = base.with_can_use_tool(permission_callback(|request| async move {
        println!("Permission requested for tool: {}", request.tool_name);
        if request.tool_name.to_lowercase().contains("write") {
            Ok(PermissionDecision::deny(
                "Write operations are not allowed in this example",
            ))
        } else {
            Ok(PermissionDecision::allow())
        }
    }));
    let mut stream = query("List files in the current directory", guarded).await?;
    while let Some(message) = stream.next().await {
        if let Message::Assistant(assistant) = message? {
            print_flush(&assistant.text());
        }
    }

    println!("\n\nDone!");
    Ok(())
}

async fn print_turn(
    turn: impl futures::Stream<Item = agentlink::Result<Message>>,
) -> anyhow::Result<()> {
    let mut turn = std::pin::pin!(turn);
    while let Some(message) = turn.next().await {
        if let Message::Assistant(assistant) = message? {
            print_flush(&assistant.text());
        }
    }
    println!();
    Ok(())
}

fn print_flush(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}
