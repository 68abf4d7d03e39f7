//! Inbound message routing
//!
//! One [`MessageRouter`] per transport reads stdout line by line, decodes each
//! record, lets the [`PermissionBroker`] take permission requests, and hands
//! everything else to a [`MessageSink`] in arrival order.

use crate::config::DecodePolicy;
use crate::error::{AgentError, Result};
use crate::permissions::{Interception, PermissionBroker};
use agentlink_protocol::{Message, decode_line};
use agentlink_transport::LineStream;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Whether the router keeps reading after a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFlow {
    /// Keep reading
    Continue,
    /// Stop the loop
    Stop,
}

/// Destination of routed messages
#[async_trait]
pub trait MessageSink: Send {
    /// Deliver one item; decode diagnostics arrive as `Err`
    async fn deliver(&mut self, item: Result<Message>) -> SinkFlow;
}

/// Sink for a single turn; stops after the Result
#[derive(Debug)]
pub struct OneShotCollector {
    tx: mpsc::Sender<Result<Message>>,
}

impl OneShotCollector {
    /// Wrap a channel sender
    pub fn new(tx: mpsc::Sender<Result<Message>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl MessageSink for OneShotCollector {
    async fn deliver(&mut self, item: Result<Message>) -> SinkFlow {
        let ends_turn = matches!(&item, Ok(message) if message.is_result());
        if self.tx.send(item).await.is_err() || ends_turn {
            SinkFlow::Stop
        } else {
            SinkFlow::Continue
        }
    }
}

/// Sink for an interactive session; delivers across turns
#[derive(Debug)]
pub struct SubscriberQueue {
    tx: mpsc::Sender<Result<Message>>,
}

impl SubscriberQueue {
    /// Wrap a channel sender
    pub fn new(tx: mpsc::Sender<Result<Message>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl MessageSink for SubscriberQueue {
    async fn deliver(&mut self, item: Result<Message>) -> SinkFlow {
        match self.tx.send(item).await {
            Ok(()) => SinkFlow::Continue,
            Err(_) => SinkFlow::Stop,
        }
    }
}

/// Why the router loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterExit {
    /// The child closed stdout
    EndOfStream,
    /// The sink asked to stop or its receiver is gone
    SinkStopped,
    /// A line failed to decode under [`DecodePolicy::Strict`]
    DecodeAborted,
    /// Reading stdout failed
    ReadFailed,
}

/// Reader loop over a transport's stdout
pub struct MessageRouter<S> {
    lines: LineStream,
    sink: S,
    broker: Arc<PermissionBroker>,
    policy: DecodePolicy,
    decoded: Option<watch::Sender<bool>>,
}

impl<S: MessageSink + 'static> MessageRouter<S> {
    /// Create a router
    pub fn new(
        lines: LineStream,
        sink: S,
        broker: Arc<PermissionBroker>,
        policy: DecodePolicy,
    ) -> Self {
        Self {
            lines,
            sink,
            broker,
            policy,
            decoded: None,
        }
    }

    /// Flip `signal` to `true` once the first line decodes
    pub fn notify_decoded(mut self, signal: watch::Sender<bool>) -> Self {
        self.decoded = Some(signal);
        self
    }

    /// Run the loop on its own task
    pub fn spawn(self) -> JoinHandle<RouterExit> {
        tokio::spawn(self.run())
    }

    /// Run the loop until the stream ends or the sink stops
    pub async fn run(mut self) -> RouterExit {
        let exit = self.route().await;
        debug!(?exit, "router stopped");
        exit
    }

    async fn route(&mut self) -> RouterExit {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return RouterExit::EndOfStream,
                Err(e) => {
                    warn!(error = %e, "failed to read agent stdout");
                    let _ = self.sink.deliver(Err(AgentError::from(e))).await;
                    return RouterExit::ReadFailed;
                }
            };

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let decoded = decode_line(&line);
            if decoded.is_ok()
                && let Some(signal) = self.decoded.take()
            {
                signal.send_replace(true);
            }

            let item: Result<Message> = match decoded {
                Ok(Message::ControlResponse(response)) => {
                    debug!(
                        request_id = %response.request_id,
                        outcome = ?response.outcome,
                        "control response"
                    );
                    continue;
                }
                Ok(message) => match self.broker.intercept(message) {
                    Interception::Consumed => continue,
                    Interception::Forward(message) => {
                        trace!(message_type = message.message_type(), "routing message");
                        Ok(message)
                    }
                },
                Err(e) => {
                    warn!(error = %e, policy = ?self.policy, "undecodable line from agent");
                    if self.policy == DecodePolicy::Strict {
                        let _ = self.sink.deliver(Err(e.into())).await;
                        return RouterExit::DecodeAborted;
                    }
                    Err(e.into())
                }
            };

            if self.sink.deliver(item).await == SinkFlow::Stop {
                return RouterExit::SinkStopped;
            }
        }
    }
}

impl<S> std::fmt::Debug for MessageRouter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
