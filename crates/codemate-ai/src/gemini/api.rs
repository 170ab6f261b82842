//! Backend trait implementation for GeminiClient.

use async_trait::async_trait;
use tracing::debug;

use crate::{AiError, Backend, BackendResponse, Message, ToolDefinition};

use super::client::GeminiClient;

#[async_trait]
impl Backend for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> Result<BackendResponse, AiError> {
        let body = self.build_request_body(history, tools, system_prompt);
        let url = self.api_url();

        debug!(
            model = %self.config.model,
            messages = history.len(),
            tools = tools.len(),
            "Gemini API request"
        );

        let response = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout
                } else {
                    AiError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            // The body usually carries a RetryInfo detail with the suggested delay.
            let text = response.text().await.unwrap_or_default();
            return Err(AiError::RateLimited(text));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AiError::ApiError(format!("HTTP {status}: {text}")));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AiError::ParseError(e.to_string()))?;

        self.parse_response(json)
    }
}
