//! Per-session and global limits: backend rate limiting, history window,
//! generation steps and delegated tool execution.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global backend rate limiting, shared by every session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Reservoir size, refilled every `window_secs` (valid range: 1-10000).
    pub requests_per_window: u32,
    pub window_secs: u64,
    /// Concurrent backend calls (valid range: 1-64).
    pub max_concurrent: u32,
    /// Total attempts for a rate-limited call, first try included (valid range: 1-10).
    pub max_attempts: u32,
    pub base_backoff_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 10,
            window_secs: 60,
            max_concurrent: 1,
            max_attempts: 3,
            base_backoff_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Messages sent to the backend per turn.
    pub history_window: usize,
    /// When set, each session appends its log to `<log_dir>/<session_id>.jsonl`.
    pub log_dir: Option<PathBuf>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_window: 20,
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Backend round trips allowed per user turn.
    pub max_steps: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { max_steps: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Seconds to wait for a delegated tool result. 0 waits forever.
    pub timeout_secs: u64,
    /// Instant-answer search endpoint. `web_search` is only offered when set.
    pub web_search_url: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            web_search_url: None,
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}
