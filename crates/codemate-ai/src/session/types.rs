//! Session types and the state guard.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use codemate_common::Envelope;
use codemate_config::schema::DEFAULT_SYSTEM_PROMPT;
use codemate_config::CodemateConfig;
use tokio::sync::mpsc;

use crate::conversation::DEFAULT_HISTORY_WINDOW;
use crate::scheduler::{RateScheduler, RetryPolicy};
use crate::Backend;

/// Envelopes queued for the client, in send order.
pub type Outbox = mpsc::UnboundedSender<Envelope>;

/// Collaborators shared by every session of a server.
#[derive(Clone)]
pub struct SessionDeps {
    pub backend: Arc<dyn Backend>,
    pub scheduler: Arc<RateScheduler>,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub system_prompt: String,
    /// Backend steps per user turn.
    pub max_steps: usize,
    pub history_window: usize,
    pub retry: RetryPolicy,
    /// Limit for delegated tool calls; `None` waits until the connection closes.
    pub tool_timeout: Option<Duration>,
    pub web_search_url: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_steps: 10,
            history_window: DEFAULT_HISTORY_WINDOW,
            retry: RetryPolicy::default(),
            tool_timeout: Some(Duration::from_secs(300)),
            web_search_url: None,
            log_dir: None,
        }
    }
}

impl From<&CodemateConfig> for SessionSettings {
    fn from(config: &CodemateConfig) -> Self {
        Self {
            system_prompt: config.backend.system_prompt.clone(),
            max_steps: config.session.max_steps as usize,
            history_window: config.conversation.history_window,
            retry: RetryPolicy::from(&config.rate_limit),
            tool_timeout: config.tools.timeout(),
            web_search_url: config.tools.web_search_url.clone(),
            log_dir: config.conversation.log_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Generating,
    /// A delegated tool call is outstanding; nested inside `Generating`.
    AwaitingTool,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Generating => "generating",
            SessionState::AwaitingTool => "awaiting_tool",
        }
    }
}

/// Sets a state on entry and restores the previous one on drop, so an early
/// return or an aborted worker never leaves a stale state behind.
pub(crate) struct StateGuard<'a> {
    state: &'a Mutex<SessionState>,
    previous: SessionState,
}

impl<'a> StateGuard<'a> {
    pub(crate) fn enter(state: &'a Mutex<SessionState>, next: SessionState) -> Self {
        let mut current = state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *current, next);
        Self { state, previous }
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = self.previous;
    }
}
