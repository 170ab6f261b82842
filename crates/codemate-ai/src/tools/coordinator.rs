//! Correlates delegated tool calls with the results the executor sends back.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use codemate_common::{ProtocolError, ToolId, ToolResultPayload};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{ToolError, ToolOutcome};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("tool call {0} is already pending")]
    Duplicate(ToolId),
}

/// Receiving half of a registered call. Consumed by [`ToolCoordinator::wait`].
#[derive(Debug)]
pub struct PendingTool {
    tool_id: ToolId,
    rx: oneshot::Receiver<ToolOutcome>,
}

impl PendingTool {
    pub fn tool_id(&self) -> &ToolId {
        &self.tool_id
    }
}

/// Pending delegated calls of one session, keyed by `toolId`.
///
/// An entry is removed by whichever of resolve, timeout or cancel happens
/// first, so each call is completed at most once.
#[derive(Debug, Default)]
pub struct ToolCoordinator {
    pending: Mutex<HashMap<ToolId, oneshot::Sender<ToolOutcome>>>,
}

impl ToolCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ToolId, oneshot::Sender<ToolOutcome>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_pending(&self, tool_id: ToolId) -> Result<PendingTool, CoordinatorError> {
        let mut entries = self.entries();
        if entries.contains_key(&tool_id) {
            return Err(CoordinatorError::Duplicate(tool_id));
        }
        let (tx, rx) = oneshot::channel();
        entries.insert(tool_id.clone(), tx);
        debug!(tool_id = %tool_id, pending = entries.len(), "tool call registered");
        Ok(PendingTool { tool_id, rx })
    }

    /// Wait for the call to be resolved or cancelled. `None` waits forever.
    pub async fn wait(&self, pending: PendingTool, timeout: Option<Duration>) -> ToolOutcome {
        let PendingTool { tool_id, rx } = pending;
        let received = match timeout {
            Some(after) => match tokio::time::timeout(after, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.forget(&tool_id);
                    warn!(tool_id = %tool_id, after_secs = after.as_secs(), "tool call timed out");
                    return Err(ToolError::Timeout { tool_id, after });
                }
            },
            None => rx.await,
        };
        // A dropped sender means the entry was discarded without an outcome.
        received.unwrap_or_else(|_| Err(ToolError::Cancelled("tool call abandoned".into())))
    }

    /// Complete the call registered under `tool_id`. Returns false, changing
    /// nothing, when no such call is pending.
    pub fn resolve(&self, tool_id: &ToolId, payload: &ToolResultPayload) -> bool {
        let Some(tx) = self.entries().remove(tool_id) else {
            return false;
        };
        let outcome = match payload.outcome() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(ToolError::Executor(error)),
            Err(ProtocolError::InvalidPayload { reason, .. }) => Err(ToolError::Protocol(reason)),
            Err(other) => Err(ToolError::Protocol(other.to_string())),
        };
        debug!(tool_id = %tool_id, ok = outcome.is_ok(), "tool call resolved");
        // The waiter may have gone away with an aborted worker.
        let _ = tx.send(outcome);
        true
    }

    /// Fail every pending call with [`ToolError::Cancelled`]. Returns how many
    /// calls were cancelled.
    pub fn cancel_all(&self, reason: &str) -> usize {
        let drained: Vec<_> = self.entries().drain().collect();
        let count = drained.len();
        for (tool_id, tx) in drained {
            debug!(tool_id = %tool_id, "tool call cancelled");
            let _ = tx.send(Err(ToolError::Cancelled(reason.to_string())));
        }
        count
    }

    /// Drop a registration without completing it.
    pub fn forget(&self, tool_id: &ToolId) -> bool {
        self.entries().remove(tool_id).is_some()
    }

    pub fn is_pending(&self, tool_id: &ToolId) -> bool {
        self.entries().contains_key(tool_id)
    }

    pub fn pending_count(&self) -> usize {
        self.entries().len()
    }
}
