//! Tool-use permission brokering
//!
//! The agent asks before running a tool by sending a `can_use_tool` control
//! request. The broker takes those requests out of the message stream, decides
//! them off the reader task, and writes exactly one decision back per request
//! id.
//!
//! Decision order:
//!
//! - `BypassPermissions`: allow without consulting anyone
//! - a configured callback: its answer, or a deny if it fails, panics or times out
//! - no callback: the mode's static policy (`AcceptEdits` allows, `Default`/`Plan` deny)

use crate::config::AgentOptions;
use crate::error::Result as AgentResult;
use crate::outbound::Outbound;
use agentlink_protocol::{
    Message, OutboundRequest, PermissionDecision, PermissionMode, PermissionRequest, RequestId,
};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Type alias for async permission callbacks
///
/// Callbacks take the request and return a decision. An `Err` becomes a deny
/// carrying the error text.
pub type PermissionCallback = Arc<
    dyn Fn(
            PermissionRequest,
        ) -> Pin<Box<dyn Future<Output = AgentResult<PermissionDecision>> + Send>>
        + Send
        + Sync,
>;

/// Build a [`PermissionCallback`] from an async closure
///
/// ```
/// use agentlink::permissions::permission_callback;
/// use agentlink_protocol::PermissionDecision;
///
/// let callback = permission_callback(|request| async move {
///     if request.tool_name.to_lowercase().contains("write") {
///         Ok(PermissionDecision::deny("writes are disabled"))
///     } else {
///         Ok(PermissionDecision::allow())
///     }
/// });
/// ```
pub fn permission_callback<F, Fut>(callback: F) -> PermissionCallback
where
    F: Fn(PermissionRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AgentResult<PermissionDecision>> + Send + 'static,
{
    Arc::new(move |request| Box::pin(callback(request)))
}

/// What the router should do with a message after the broker saw it
#[derive(Debug)]
#[must_use]
pub enum Interception {
    /// A permission request; the broker owns it now
    Consumed,

    /// Anything else, handed back for delivery
    Forward(Message),
}

/// The right to answer one permission request
///
/// Only [`PermissionBroker::claim`] creates slots, at most one per request id,
/// and [`resolve`](Self::resolve) consumes the slot.
#[derive(Debug)]
pub struct DecisionSlot {
    request_id: RequestId,
    proposed_input: Value,
    outbound: Outbound,
}

impl DecisionSlot {
    /// Id of the request this slot answers
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Write the decision to the child
    pub async fn resolve(self, decision: PermissionDecision) -> AgentResult<()> {
        let decision = decision.with_default_input(&self.proposed_input);
        debug!(
            request_id = %self.request_id,
            allow = decision.is_allow(),
            "writing permission decision"
        );
        self.outbound
            .send(&OutboundRequest::decision(self.request_id, decision))
            .await
    }
}

#[derive(Clone)]
struct Policy {
    mode: PermissionMode,
    callback: Option<PermissionCallback>,
    timeout: Option<Duration>,
}

impl Policy {
    async fn decide(&self, request: PermissionRequest) -> PermissionDecision {
        if self.mode == PermissionMode::BypassPermissions {
            return PermissionDecision::allow();
        }

        let Some(callback) = self.callback.clone() else {
            return static_decision(self.mode, &request.tool_name);
        };

        let tool_name = request.tool_name.clone();
        // dropping the set aborts the callback
        let mut call = JoinSet::new();
        call.spawn(async move { callback(request).await });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call.join_next()).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(tool = %tool_name, ?limit, "permission callback timed out");
                    return PermissionDecision::deny(format!(
                        "permission callback timed out after {limit:?}"
                    ));
                }
            },
            None => call.join_next().await,
        };

        match joined {
            Some(Ok(Ok(decision))) => decision,
            Some(Ok(Err(e))) => {
                warn!(tool = %tool_name, error = %e, "permission callback failed");
                PermissionDecision::deny(format!("permission callback failed: {e}"))
            }
            Some(Err(e)) => {
                warn!(tool = %tool_name, error = %e, "permission callback panicked");
                PermissionDecision::deny("permission callback panicked")
            }
            None => PermissionDecision::deny("permission callback did not run"),
        }
    }
}

fn static_decision(mode: PermissionMode, tool_name: &str) -> PermissionDecision {
    if mode.allows_by_default() {
        PermissionDecision::allow()
    } else {
        PermissionDecision::deny(format!(
            "tool `{tool_name}` denied: no permission callback in {mode} mode"
        ))
    }
}

/// Intercepts permission requests and answers them
pub struct PermissionBroker {
    policy: Policy,
    outbound: Outbound,
    claimed: Mutex<HashSet<RequestId>>,
    tasks: Mutex<JoinSet<()>>,
}

impl PermissionBroker {
    /// Create a broker writing through `outbound`
    pub fn new(options: &AgentOptions, outbound: Outbound) -> Self {
        Self {
            policy: Policy {
                mode: options.permission_mode,
                callback: options.can_use_tool.clone(),
                timeout: options.permission_timeout,
            },
            outbound,
            claimed: Mutex::new(HashSet::new()),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Take permission requests out of the stream
    ///
    /// A consumed request is decided on a separate task so the reader keeps
    /// draining stdout while the host thinks.
    pub fn intercept(&self, message: Message) -> Interception {
        let Message::PermissionRequest(request) = message else {
            return Interception::Forward(message);
        };

        let Some(slot) = self.claim(&request) else {
            warn!(
                request_id = %request.request_id,
                tool = %request.tool_name,
                "duplicate permission request ignored"
            );
            return Interception::Consumed;
        };

        debug!(
            request_id = %request.request_id,
            tool = %request.tool_name,
            mode = %self.policy.mode,
            "permission requested"
        );

        let policy = self.policy.clone();
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let decision = policy.decide(request).await;
            if let Err(e) = slot.resolve(decision).await {
                warn!(error = %e, "failed to write permission decision");
            }
        });

        Interception::Consumed
    }

    /// Reserve the single decision for a request id
    ///
    /// Returns `None` when the id was already claimed.
    pub fn claim(&self, request: &PermissionRequest) -> Option<DecisionSlot> {
        let fresh = self
            .claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.request_id.clone());

        fresh.then(|| DecisionSlot {
            request_id: request.request_id.clone(),
            proposed_input: request.input.clone(),
            outbound: self.outbound.clone(),
        })
    }

    /// Decisions still being worked out
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Abandon outstanding decisions
    pub fn shutdown(&self) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_all();
    }
}

impl std::fmt::Debug for PermissionBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionBroker")
            .field("mode", &self.policy.mode)
            .field("callback", &self.policy.callback.is_some())
            .field("timeout", &self.policy.timeout)
            .finish_non_exhaustive()
    }
}
