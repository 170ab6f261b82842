//! Session lifecycle and inbound envelope handling.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use codemate_common::{Command, Envelope, Payload, ProtocolError, SessionId, ToolId};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::conversation::{ConversationLog, ConversationStore};
use crate::plan::PlanStore;
use crate::token_tracker::TokenTracker;
use crate::tools::{ToolContext, ToolCoordinator, ToolRegistry};

use super::types::{Outbox, SessionDeps, SessionSettings, SessionState};
use super::{chat, commands};

/// State owned by one session and shared between the connection-facing
/// handle and the generation worker.
pub(super) struct Shared {
    pub(super) id: SessionId,
    pub(super) outbox: Outbox,
    pub(super) deps: SessionDeps,
    pub(super) settings: SessionSettings,
    pub(super) coordinator: ToolCoordinator,
    pub(super) registry: ToolRegistry,
    pub(super) conversation: Mutex<ConversationStore>,
    pub(super) plans: Mutex<PlanStore>,
    pub(super) tracker: StdMutex<TokenTracker>,
    pub(super) state: StdMutex<SessionState>,
}

impl Shared {
    /// Queue an envelope for the client. Fails only after the connection is gone.
    pub(super) fn send(&self, envelope: Envelope) {
        if self.outbox.send(envelope).is_err() {
            debug!(session = %self.id, "outbox closed, envelope dropped");
        }
    }

    pub(super) fn tool_context(&self) -> ToolContext<'_> {
        ToolContext {
            session_id: &self.id,
            outbox: &self.outbox,
            coordinator: &self.coordinator,
            plans: &self.plans,
            timeout: self.settings.tool_timeout,
        }
    }

    pub(super) fn tracker(&self) -> std::sync::MutexGuard<'_, TokenTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One connected client.
///
/// User inputs are queued to a single worker task, so at most one
/// generation runs at a time. Tool results and commands are handled as they
/// arrive, even while a generation is waiting on a tool.
pub struct Session {
    shared: Arc<Shared>,
    inputs: mpsc::UnboundedSender<String>,
    worker: JoinHandle<()>,
    background: JoinSet<()>,
}

impl Session {
    /// Create a session and start its worker. Must run inside a Tokio runtime.
    pub fn open(deps: SessionDeps, settings: SessionSettings, outbox: Outbox) -> Self {
        let id = SessionId::new();
        let mut conversation = ConversationStore::new(settings.history_window);
        if let Some(dir) = &settings.log_dir {
            conversation = conversation.with_log(ConversationLog::new(dir, id.as_str()));
        }
        let shared = Arc::new(Shared {
            registry: ToolRegistry::new(settings.web_search_url.as_deref()),
            coordinator: ToolCoordinator::new(),
            conversation: Mutex::new(conversation),
            plans: Mutex::new(PlanStore::new()),
            tracker: StdMutex::new(TokenTracker::new()),
            state: StdMutex::new(SessionState::Idle),
            id,
            outbox,
            deps,
            settings,
        });

        let (inputs, mut queue) = mpsc::unbounded_channel::<String>();
        let worker_shared = shared.clone();
        let worker = tokio::spawn(async move {
            while let Some(content) = queue.recv().await {
                chat::run_turn(&worker_shared, content).await;
            }
        });

        info!(session = %shared.id, backend = shared.deps.backend.name(), "session opened");
        Self {
            shared,
            inputs,
            worker,
            background: JoinSet::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.shared.id
    }

    pub fn state(&self) -> SessionState {
        *self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pending_tools(&self) -> usize {
        self.shared.coordinator.pending_count()
    }

    pub fn token_usage(&self) -> crate::TokenUsage {
        *self.shared.tracker().total()
    }

    /// Apply one inbound envelope. A protocol error leaves the session
    /// usable; the caller reports it to the client.
    pub async fn handle(&mut self, envelope: Envelope) -> Result<(), ProtocolError> {
        // Reap finished compactions.
        while self.background.try_join_next().is_some() {}

        match envelope.payload {
            Payload::UserInput(input) => {
                debug!(session = %self.shared.id, chars = input.content.len(), "user input queued");
                if self.inputs.send(input.content).is_err() {
                    warn!(session = %self.shared.id, "worker stopped, input dropped");
                }
                Ok(())
            }
            Payload::ToolResult(result) => {
                let tool_id = ToolId::from(result.tool_id.as_str());
                // Checked first so a pending call is still failed below.
                let malformed = result.outcome().err();
                if !self.shared.coordinator.resolve(&tool_id, &result) {
                    warn!(session = %self.shared.id, tool_id = %tool_id, "tool result without a pending call");
                    return Err(ProtocolError::UnexpectedToolResult(result.tool_id));
                }
                match malformed {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
            Payload::Command(command) => {
                match command.parsed() {
                    Some(Command::Clear) => commands::clear(&self.shared).await,
                    Some(Command::Compact) => {
                        let shared = self.shared.clone();
                        self.background
                            .spawn(async move { commands::compact(&shared).await });
                    }
                    None => commands::unknown(&self.shared, &command.command),
                }
                Ok(())
            }
            Payload::ToolRegistration(registration) => {
                self.shared
                    .registry
                    .register_extensions(registration.tools)
                    .await;
                Ok(())
            }
            other => Err(ProtocolError::UnexpectedType(
                other.message_type().as_str().to_string(),
            )),
        }
    }

    /// Tear the session down: fail outstanding tool calls, stop the worker
    /// and any compaction in flight.
    pub async fn close(mut self) {
        let cancelled = self.shared.coordinator.cancel_all("connection closed");
        self.worker.abort();
        self.background.abort_all();
        // Join so nothing still holds the stores once close returns.
        let _ = (&mut self.worker).await;
        while self.background.join_next().await.is_some() {}

        let tracker = self.shared.tracker();
        info!(
            session = %self.shared.id,
            cancelled_tools = cancelled,
            backend_calls = tracker.call_count(),
            input_tokens = tracker.total().input_tokens,
            output_tokens = tracker.total().output_tokens,
            "session closed"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.coordinator.cancel_all("session dropped");
        self.worker.abort();
    }
}
