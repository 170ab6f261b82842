//! Reasoning backend selection and generation parameters.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a coding assistant working inside the user's \
project. Use the available tools to read, search and modify files and to run commands. \
For multi-step work, create a plan first and keep task statuses up to date as you go. \
Answer concisely once the work is done.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    #[default]
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub provider: BackendProvider,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub system_prompt: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: BackendProvider::Gemini,
            model: "gemini-2.0-flash".into(),
            max_tokens: 8192,
            temperature: 0.7,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            api_key_env: "GEMINI_API_KEY".into(),
        }
    }
}
