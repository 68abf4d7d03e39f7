//! Core session management
//!
//! Provides the [`SessionClient`] struct, connection setup and teardown.

use crate::config::AgentOptions;
use crate::error::{AgentError, Result as AgentResult};
use crate::lifecycle::ShutdownGuard;
use crate::outbound::Outbound;
use crate::permissions::PermissionBroker;
use crate::routing::{MessageRouter, RouterExit, SubscriberQueue};
use crate::session::state::SessionState;
use agentlink_protocol::{Message, OutboundRequest, ResultMessage};
use agentlink_transport::{ProcessTransport, Transport};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything that exists only while a child is attached
pub(crate) struct Link {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) outbound: Outbound,
    pub(crate) broker: Arc<PermissionBroker>,
    pub(crate) inbox: mpsc::Receiver<AgentResult<Message>>,
    pub(crate) router: JoinHandle<RouterExit>,
    decoded: watch::Receiver<bool>,
}

impl Link {
    fn start(options: &AgentOptions, transport: Arc<dyn Transport>) -> AgentResult<Self> {
        let lines = transport.read_lines()?;
        let outbound = Outbound::new(Arc::clone(&transport));
        let broker = Arc::new(PermissionBroker::new(options, outbound.clone()));
        let (tx, inbox) = mpsc::channel(options.channel_capacity);
        let (signal, decoded) = watch::channel(false);
        let router = MessageRouter::new(
            lines,
            SubscriberQueue::new(tx),
            Arc::clone(&broker),
            options.decode_policy,
        )
        .notify_decoded(signal)
        .spawn();

        Ok(Self {
            transport,
            outbound,
            broker,
            inbox,
            router,
            decoded,
        })
    }

    /// Whether the child has produced a decodable record
    fn has_decoded(&self) -> bool {
        *self.decoded.borrow()
    }

    /// Child gone, its output fully routed and consumed
    fn is_lost(&self) -> bool {
        self.transport.exit_status().is_some()
            && self.router.is_finished()
            && self.inbox.is_empty()
    }

    /// Teardown that runs when the client goes away without `disconnect`
    fn guard(&self) -> ShutdownGuard {
        let transport = Arc::clone(&self.transport);
        let broker = Arc::clone(&self.broker);
        let router = self.router.abort_handle();
        ShutdownGuard::new(move || {
            transport.begin_shutdown();
            router.abort();
            broker.shutdown();
        })
    }
}

/// An interactive conversation with one agent process
///
/// A session is driven from a single task: every operation takes `&mut self`,
/// so a turn cannot be consumed twice and prompts cannot race. Dropping the
/// client starts the same teardown as [`disconnect`](Self::disconnect) in the
/// background.
///
/// # Example
///
/// ```no_run
/// use agentlink::{AgentOptions, create_session};
/// use futures::StreamExt;
///
/// # async fn example() -> agentlink::Result<()> {
/// let mut session = create_session(AgentOptions::new());
/// session.connect("What is 2+2?").await?;
///
/// let mut turn = Box::pin(session.receive_response());
/// while let Some(message) = turn.next().await {
///     println!("{:?}", message?);
/// }
/// drop(turn);
///
/// session.query("And 3+3?").await?;
/// let replies: Vec<_> = session.receive_response().collect().await;
/// println!("{} messages", replies.len());
///
/// session.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionClient {
    pub(crate) options: Arc<AgentOptions>,
    pub(crate) injected: Option<Arc<dyn Transport>>,
    pub(crate) link: Option<Link>,
    pub(crate) state: SessionState,
    pub(crate) session_id: Option<String>,
    pub(crate) turn_in_flight: bool,
    pub(crate) last_result: Option<ResultMessage>,
    pub(crate) guard: Option<ShutdownGuard>,
}

impl SessionClient {
    /// Create an unconnected session that will spawn the agent CLI
    pub fn new(options: AgentOptions) -> Self {
        Self {
            options: Arc::new(options),
            injected: None,
            link: None,
            state: SessionState::Unconnected,
            session_id: None,
            turn_in_flight: false,
            last_result: None,
            guard: None,
        }
    }

    /// Create an unconnected session over an existing transport
    pub fn with_transport(options: AgentOptions, transport: Arc<dyn Transport>) -> Self {
        Self {
            injected: Some(transport),
            ..Self::new(options)
        }
    }

    /// Start the agent and send the first prompt
    ///
    /// # Errors
    ///
    /// - [`AgentError::Config`] for invalid options, state unchanged
    /// - [`AgentError::Spawn`] when the process cannot start; the session is closed
    /// - [`AgentError::Usage`] when already connected
    /// - [`AgentError::SessionClosed`] after close
    pub async fn connect(&mut self, prompt: impl Into<String>) -> AgentResult<()> {
        match self.state {
            SessionState::Unconnected => {}
            SessionState::Closed => return Err(AgentError::SessionClosed),
            state => {
                return Err(AgentError::usage(format!(
                    "connect called on a {state} session"
                )));
            }
        }
        self.options.validate()?;
        self.state = SessionState::Connecting;

        let transport: Arc<dyn Transport> = match self.injected.take() {
            Some(transport) => transport,
            None => match ProcessTransport::spawn(self.options.to_process_config()) {
                Ok(transport) => Arc::new(transport),
                Err(e) => {
                    warn!(error = %e, "failed to start agent process");
                    self.state = SessionState::Closed;
                    return Err(e.into());
                }
            },
        };

        let link = match Link::start(&self.options, transport) {
            Ok(link) => link,
            Err(e) => {
                self.state = SessionState::Closed;
                return Err(e);
            }
        };
        self.guard = Some(link.guard());
        self.link = Some(link);
        debug!("session connecting");

        self.send_prompt(prompt.into()).await
    }

    /// Close stdin, drain what is in flight and stop the process
    ///
    /// Idempotent. Messages drained here are discarded, except that a final
    /// Result still updates [`last_result`](Self::last_result).
    pub async fn disconnect(&mut self) -> AgentResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        let Some(link) = self.link.take() else {
            self.state = SessionState::Closed;
            return Ok(());
        };

        self.state = SessionState::Draining;
        if let Some(guard) = self.guard.take() {
            guard.disarm();
        }

        let Link {
            transport,
            broker,
            mut inbox,
            router,
            ..
        } = link;

        if let Err(e) = transport.close_input().await {
            debug!(error = %e, "closing agent stdin failed");
        }

        let grace_period = self.options.grace_period;
        let drain = async {
            let mut drained = 0usize;
            while let Some(item) = inbox.recv().await {
                if let Ok(Message::Result(result)) = item {
                    self.last_result = Some(result);
                }
                drained += 1;
            }
            drained
        };
        let drained = tokio::time::timeout(grace_period, drain).await;

        let exit = transport.terminate(drained.is_ok()).await;
        router.abort();
        broker.shutdown();
        self.state = SessionState::Closed;
        self.turn_in_flight = false;

        let exit = exit?;
        info!(
            session_id = ?self.session_id,
            code = ?exit.code,
            killed = exit.killed,
            drained = ?drained.ok(),
            "session closed"
        );
        Ok(())
    }

    /// Current lifecycle state
    ///
    /// Reflects the wire as of this call: a session reports `Connected` once
    /// the router decoded the child's first record, and `Closed` once the
    /// child exited and everything it sent has been consumed.
    pub fn state(&self) -> SessionState {
        match (&self.link, self.state) {
            (Some(link), SessionState::Connecting | SessionState::Connected)
                if link.is_lost() =>
            {
                SessionState::Closed
            }
            (Some(link), SessionState::Connecting) if link.has_decoded() => {
                SessionState::Connected
            }
            (_, state) => state,
        }
    }

    /// Session id assigned by the child, once seen
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Whether the session reached its terminal state
    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// The Result of the most recent completed turn
    pub fn last_result(&self) -> Option<&ResultMessage> {
        self.last_result.as_ref()
    }

    /// Bring the stored state up to date with [`state`](Self::state)
    pub(crate) fn refresh(&mut self) {
        match self.state() {
            SessionState::Closed if self.state != SessionState::Closed => self.mark_closed(),
            SessionState::Connected if self.state == SessionState::Connecting => {
                self.state = SessionState::Connected;
                info!("session connected");
            }
            _ => {}
        }
    }

    /// Write a prompt and mark a turn as pending
    pub(crate) async fn send_prompt(&mut self, text: String) -> AgentResult<()> {
        let link = self.link.as_ref().ok_or(AgentError::SessionClosed)?;
        let request = OutboundRequest::user_prompt(text, self.session_id.as_deref());

        match link.outbound.send(&request).await {
            Ok(()) => {
                self.turn_in_flight = true;
                Ok(())
            }
            Err(e) => {
                if e.closes_session() {
                    self.mark_closed();
                }
                Err(e)
            }
        }
    }

    /// Track state from a delivered message
    pub(crate) fn observe(&mut self, message: &Message) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Connected;
            info!(session_id = ?message.session_id(), "session connected");
        }
        if let Some(id) = message.session_id()
            && self.session_id.as_deref() != Some(id)
        {
            debug!(session_id = id, "session id assigned");
            self.session_id = Some(id.to_string());
        }
        if let Message::Result(result) = message {
            self.turn_in_flight = false;
            self.last_result = Some(result.clone());
        }
    }

    /// Move to `Closed` after a transport failure
    pub(crate) fn mark_closed(&mut self) {
        if self.state != SessionState::Closed {
            warn!(session_id = ?self.session_id, state = %self.state, "agent connection lost");
        }
        self.state = SessionState::Closed;
        self.turn_in_flight = false;
        if let Some(guard) = self.guard.take() {
            guard.cleanup();
        }
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("state", &self.state)
            .field("session_id", &self.session_id)
            .field("turn_in_flight", &self.turn_in_flight)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubTransport;
    use agentlink_protocol::SystemMessage;

    #[test]
    fn test_new_session_is_unconnected() {
        let session = SessionClient::new(AgentOptions::default());
        assert_eq!(session.state(), SessionState::Unconnected);
        assert!(session.session_id().is_none());
        assert!(session.last_result().is_none());
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_invalid_options_leave_state_unchanged() {
        let mut session = SessionClient::new(AgentOptions::new().with_channel_capacity(0));
        let err = session.connect("hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
        assert_eq!(session.state(), SessionState::Unconnected);
    }

    #[tokio::test]
    async fn test_connect_twice_is_usage_error() {
        let transport = StubTransport::spawn(|mut child| async move {
            while let Ok(Some(_)) = child.next_request().await {}
        });
        let mut session = SessionClient::with_transport(AgentOptions::new(), Arc::new(transport));

        session.connect("hi").await.unwrap();
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(matches!(
            session.connect("again").await,
            Err(AgentError::Usage(_))
        ));

        session.disconnect().await.unwrap();
        assert!(session.is_closed());
        assert!(matches!(
            session.connect("again").await,
            Err(AgentError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_observe_tracks_connection_and_session_id() {
        let mut session = SessionClient::new(AgentOptions::default());
        session.state = SessionState::Connecting;
        session.turn_in_flight = true;

        session.observe(&SystemMessage::new("init", Some("s-42".into())).into());
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.session_id(), Some("s-42"));
        assert!(session.turn_in_flight);

        session.observe(&ResultMessage::new("s-42", 1).into());
        assert!(!session.turn_in_flight);
        assert_eq!(session.last_result().map(|r| r.num_turns), Some(1));
    }

    #[tokio::test]
    async fn test_disconnect_unconnected_closes() {
        let mut session = SessionClient::new(AgentOptions::default());
        session.disconnect().await.unwrap();
        assert!(session.is_closed());
        session.disconnect().await.unwrap();
    }
}
