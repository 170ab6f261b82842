//! Session engine for codemate.
//!
//! Drives one agent conversation per connection:
//! - `Backend` trait plus a Gemini implementation
//! - global rate scheduler with queueing and rate-limit retries
//! - tool coordinator for calls delegated to the remote executor
//! - tool registry (built-in, local and dynamically registered tools)
//! - conversation and plan stores
//! - token usage tracking

pub mod conversation;
pub mod gemini;
pub mod plan;
pub mod scheduler;
pub mod session;
pub mod token_tracker;
pub mod tools;

use async_trait::async_trait;

pub use codemate_common::ToolDefinition;
pub use conversation::ConversationStore;
pub use gemini::{GeminiClient, GeminiConfig};
pub use plan::{PlanError, PlanStore};
pub use scheduler::{RateScheduler, RetryNotice, RetryPolicy, SchedulerConfig, SchedulerError};
pub use session::{Session, SessionDeps, SessionSettings, SessionState};
pub use token_tracker::TokenTracker;
pub use tools::{ToolCoordinator, ToolError, ToolRegistry};

/// A reasoning backend: turns a history plus callable tools into either text
/// or a batch of tool calls.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short provider name used for token accounting and logs.
    fn name(&self) -> &str;

    async fn generate(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> Result<BackendResponse, AiError>;
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Internal bookkeeping, never sent to the backend.
    System,
}

#[derive(Debug, Clone, Default)]
pub struct BackendResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("API error: {0}")]
    ApiError(String),
    /// The backend refused the call for quota reasons. Carries the response
    /// body so a suggested retry delay can be recovered from it.
    #[error("rate limit exceeded (429): {0}")]
    RateLimited(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Missing API key: set {0}")]
    MissingApiKey(String),
    #[error("Timeout")]
    Timeout,
}
