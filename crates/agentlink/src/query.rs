//! One-shot queries
//!
//! [`query`] starts a fresh agent process, sends one prompt and streams the
//! turn back. The process is stopped once the turn's Result has been read,
//! when the output ends, or when the [`QueryStream`] is dropped.

use crate::config::AgentOptions;
use crate::error::{AgentError, Result};
use crate::lifecycle::ShutdownGuard;
use crate::outbound::Outbound;
use crate::permissions::PermissionBroker;
use crate::routing::{MessageRouter, OneShotCollector};
use agentlink_protocol::{Message, OutboundRequest};
use agentlink_transport::{ProcessExit, ProcessTransport, Transport};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Run one prompt against a new agent process
///
/// # Example
///
/// ```no_run
/// use agentlink::{AgentOptions, query};
/// use futures::StreamExt;
///
/// # async fn example() -> agentlink::Result<()> {
/// let mut stream = query("What is 2+2?", AgentOptions::new()).await?;
/// while let Some(message) = stream.next().await {
///     println!("{}", message?.message_type());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn query(prompt: impl Into<String>, options: AgentOptions) -> Result<QueryStream> {
    options.validate()?;
    let transport = ProcessTransport::spawn(options.to_process_config())?;
    query_with_transport(prompt, options, Arc::new(transport)).await
}

/// Run one prompt over an existing transport
pub async fn query_with_transport(
    prompt: impl Into<String>,
    options: AgentOptions,
    transport: Arc<dyn Transport>,
) -> Result<QueryStream> {
    let guard = {
        let transport = Arc::clone(&transport);
        ShutdownGuard::new(move || transport.begin_shutdown())
    };
    options.validate()?;

    let lines = transport.read_lines()?;
    let outbound = Outbound::new(Arc::clone(&transport));
    let broker = Arc::new(PermissionBroker::new(&options, outbound.clone()));
    let (tx, inbox) = mpsc::channel(options.channel_capacity);
    let router = MessageRouter::new(
        lines,
        OneShotCollector::new(tx),
        Arc::clone(&broker),
        options.decode_policy,
    );

    let driver = tokio::spawn({
        let transport = Arc::clone(&transport);
        async move {
            let reason = router.run().await;
            broker.shutdown();
            match transport.terminate(true).await {
                Ok(exit) => debug!(?reason, code = ?exit.code, killed = exit.killed, "query finished"),
                Err(e) => warn!(?reason, error = %e, "failed to stop agent process"),
            }
        }
    });

    outbound
        .send(&OutboundRequest::user_prompt(prompt, None))
        .await?;

    Ok(QueryStream {
        inbox,
        driver: Some(driver),
        transport,
        guard: Some(guard),
    })
}

/// Run one prompt and return the assistant's text
///
/// Text blocks of every Assistant message before the Result are concatenated
/// without separators. Undecodable lines are logged and skipped.
pub async fn query_text(prompt: impl Into<String>, options: AgentOptions) -> Result<String> {
    query(prompt, options).await?.text().await
}

/// Messages of a one-shot query
///
/// Yields every message up to and including the Result. The stream ends only
/// after the agent process has been stopped.
pub struct QueryStream {
    inbox: mpsc::Receiver<Result<Message>>,
    driver: Option<JoinHandle<()>>,
    transport: Arc<dyn Transport>,
    guard: Option<ShutdownGuard>,
}

impl QueryStream {
    /// Concatenated assistant text of the turn
    pub async fn text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(item) = self.next().await {
            match item {
                Ok(Message::Assistant(assistant)) => text.push_str(&assistant.text()),
                Ok(_) => {}
                Err(AgentError::Decode(e)) => warn!(error = %e, "skipping undecodable line"),
                Err(e) => return Err(e),
            }
        }
        Ok(text)
    }

    /// Stop reading and shut the process down
    pub async fn close(mut self) -> Result<ProcessExit> {
        self.inbox.close();
        if let Some(guard) = self.guard.take() {
            guard.disarm();
        }
        let exit = self.transport.terminate(true).await?;
        if let Some(driver) = self.driver.take()
            && let Err(e) = driver.await
        {
            warn!(error = %e, "query driver failed");
        }
        Ok(exit)
    }

    /// Exit status of the agent process, once it stopped
    pub fn exit_status(&self) -> Option<ProcessExit> {
        self.transport.exit_status()
    }
}

impl Stream for QueryStream {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if let Some(item) = ready!(this.inbox.poll_recv(cx)) {
            return Poll::Ready(Some(item));
        }

        if let Some(driver) = this.driver.as_mut() {
            let joined = ready!(Pin::new(driver).poll(cx));
            this.driver = None;
            match joined {
                Ok(()) => {
                    if let Some(guard) = this.guard.take() {
                        guard.disarm();
                    }
                }
                Err(e) => warn!(error = %e, "query driver failed"),
            }
        }
        Poll::Ready(None)
    }
}

impl std::fmt::Debug for QueryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStream")
            .field("running", &self.transport.is_running())
            .field("finished", &self.driver.is_none())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubTransport;
    use agentlink_protocol::{AssistantMessage, ContentBlock, ResultMessage};
    use std::time::Duration;

    fn answering(reply: &'static str) -> Arc<StubTransport> {
        Arc::new(StubTransport::spawn(move |mut child| async move {
            if let Ok(Some(_)) = child.next_request().await {
                let _ = child
                    .emit(AssistantMessage::new(
                        vec![ContentBlock::text(reply)],
                        Some("s1".into()),
                    ))
                    .await;
                let _ = child.emit(ResultMessage::new("s1", 1)).await;
            }
            while let Ok(Some(_)) = child.next_request().await {}
        }))
    }

    #[tokio::test]
    async fn test_stream_ends_after_process_stops() {
        let transport = answering("4");
        let stream = query_with_transport("2+2?", AgentOptions::new(), transport.clone())
            .await
            .unwrap();

        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].as_ref().unwrap().is_result());
        assert!(!transport.is_running());
    }

    #[tokio::test]
    async fn test_text_concatenates_assistant_blocks() {
        let stream = query_with_transport("2+2?", AgentOptions::new(), answering("4"))
            .await
            .unwrap();
        assert_eq!(stream.text().await.unwrap(), "4");
    }

    #[tokio::test]
    async fn test_close_stops_process() {
        let transport = answering("4");
        let stream = query_with_transport("2+2?", AgentOptions::new(), transport.clone())
            .await
            .unwrap();

        let exit = tokio::time::timeout(Duration::from_secs(5), stream.close())
            .await
            .unwrap()
            .unwrap();
        assert!(exit.success());
        assert!(!transport.is_running());
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_before_writing() {
        let transport = answering("4");
        let err = query_with_transport(
            "2+2?",
            AgentOptions::new().with_channel_capacity(0),
            transport.clone(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }
}
