//! Turns within a session
//!
//! Follow-up prompts, per-turn message streams and interrupts.

use crate::error::{AgentError, Result as AgentResult};
use crate::session::core::SessionClient;
use crate::session::state::SessionState;
use agentlink_protocol::{Message, OutboundRequest};
use futures::Stream;
use futures::stream;
use tracing::debug;

impl SessionClient {
    /// Send a follow-up prompt
    ///
    /// # Errors
    ///
    /// - [`AgentError::Usage`] before `connect`, or while the previous turn
    ///   has not produced its Result; the session is unchanged
    /// - [`AgentError::SessionClosed`] once the session is closing or closed
    /// - [`AgentError::BrokenPipe`] when the child is gone; the session closes
    pub async fn query(&mut self, text: impl Into<String>) -> AgentResult<()> {
        self.refresh();
        match self.state {
            SessionState::Draining | SessionState::Closed => Err(AgentError::SessionClosed),
            SessionState::Unconnected => Err(AgentError::usage("call connect before query")),
            _ if self.turn_in_flight => Err(AgentError::usage(
                "the previous turn has not produced its result yet",
            )),
            _ => self.send_prompt(text.into()).await,
        }
    }

    /// Messages of the current turn, up to and including its Result
    ///
    /// The stream borrows the session mutably; a second consumer is a compile
    /// error. It ends after the Result, after an error that closes the
    /// session, or when the child closes its output. Without a pending turn it
    /// yields a single [`AgentError::Usage`].
    pub fn receive_response(&mut self) -> impl Stream<Item = AgentResult<Message>> + '_ {
        stream::unfold((self, false), |(session, done)| async move {
            if done {
                return None;
            }
            let (item, ends) = session.next_in_turn().await?;
            Some((item, (session, ends)))
        })
    }

    /// Ask the child to stop the current turn
    ///
    /// The turn still ends with a Result, which [`receive_response`](Self::receive_response)
    /// delivers as usual.
    pub async fn interrupt(&mut self) -> AgentResult<()> {
        self.refresh();
        if !self.state.is_open() {
            return Err(match self.state {
                SessionState::Unconnected => AgentError::usage("call connect before interrupt"),
                _ => AgentError::SessionClosed,
            });
        }
        let link = self.link.as_ref().ok_or(AgentError::SessionClosed)?;
        let request = OutboundRequest::interrupt();
        debug!(kind = request.kind(), "interrupting turn");

        if let Err(e) = link.outbound.send(&request).await {
            if e.closes_session() {
                self.mark_closed();
            }
            return Err(e);
        }
        Ok(())
    }

    /// Next item of the pending turn and whether it ends the stream
    async fn next_in_turn(&mut self) -> Option<(AgentResult<Message>, bool)> {
        // a pending turn ends naturally when the child's output runs dry
        if !self.turn_in_flight {
            self.refresh();
        }
        if self.state == SessionState::Closed {
            return Some((Err(AgentError::SessionClosed), true));
        }
        if !self.turn_in_flight {
            return Some((
                Err(AgentError::usage("no turn in progress; call connect or query first")),
                true,
            ));
        }

        let link = self.link.as_mut()?;
        match link.inbox.recv().await {
            Some(Ok(message)) => {
                self.observe(&message);
                let ends = message.is_result();
                Some((Ok(message), ends))
            }
            Some(Err(e)) => {
                let closes = e.closes_session();
                if closes {
                    self.mark_closed();
                }
                Some((Err(e), closes))
            }
            None => {
                debug!("agent output ended");
                self.mark_closed();
                None
            }
        }
    }
}
