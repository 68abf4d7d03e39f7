//! Write side of a transport
//!
//! Callers and the permission broker both write through an [`Outbound`]. The
//! transport serializes whole lines, so records never interleave.

use crate::error::Result;
use agentlink_protocol::{OutboundRequest, encode};
use agentlink_transport::Transport;
use std::sync::Arc;
use tracing::trace;

/// Cloneable handle that can only write requests to the child
#[derive(Clone)]
pub struct Outbound {
    transport: Arc<dyn Transport>,
}

impl Outbound {
    /// Wrap a transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Encode a request and write it as one line
    pub async fn send(&self, request: &OutboundRequest) -> Result<()> {
        let line = encode(request)?;
        trace!(kind = request.kind(), bytes = line.len(), "writing request");
        self.transport.write_line(&line).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("running", &self.transport.is_running())
            .finish()
    }
}
