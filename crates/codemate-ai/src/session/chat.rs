//! The generation loop: one user turn, possibly many backend steps.

use codemate_common::Envelope;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::scheduler::{RetryNotice, SchedulerError};
use crate::{AiError, BackendResponse, Message, ToolDefinition};

use super::manager::Shared;
use super::types::{SessionState, StateGuard};

pub(super) const EMPTY_RESPONSE: &str = "empty response, please retry";

const PREVIEW_CHARS: usize = 200;

pub(super) fn queue_notice(position: usize) -> Envelope {
    Envelope::llm_response(format!(
        "⏳ Your request is queued (position {position}). Please wait..."
    ))
}

pub(super) fn retry_notice(notice: &RetryNotice) -> Envelope {
    Envelope::llm_response(format!(
        "⏳ Rate limit exceeded. Retrying in {} seconds... (attempt {}/{})",
        notice.delay_secs(),
        notice.attempt,
        notice.max_attempts
    ))
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Handle one user input end to end and send the reply.
pub(super) async fn run_turn(shared: &Shared, content: String) {
    let _generating = StateGuard::enter(&shared.state, SessionState::Generating);
    let mut messages = {
        let mut conversation = shared.conversation.lock().await;
        conversation.add_user_message(content);
        conversation.history()
    };

    match generate(shared, &mut messages).await {
        Ok(Some(text)) => {
            shared
                .conversation
                .lock()
                .await
                .add_assistant_message(text.clone());
            shared.send(Envelope::llm_response(text));
        }
        Ok(None) => {
            warn!(session = %shared.id, "backend produced no output");
            shared.send(Envelope::llm_response(EMPTY_RESPONSE));
        }
        Err(err) => {
            warn!(session = %shared.id, error = %err, "generation failed");
            shared.send(Envelope::error(err.to_string(), Some(err.code())));
        }
    }
}

/// Run up to `max_steps` backend steps. Returns the final text, or `None`
/// when the backend never produced any.
async fn generate(
    shared: &Shared,
    messages: &mut Vec<Message>,
) -> Result<Option<String>, SchedulerError<AiError>> {
    let tools = shared.registry.definitions().await;
    let mut last_text = String::new();

    for step in 1..=shared.settings.max_steps {
        let response = call_backend(shared, messages, &tools).await?;
        log_step(shared, step, &response);

        if response.tool_calls.is_empty() {
            let text = if response.text.trim().is_empty() {
                last_text
            } else {
                response.text
            };
            return Ok((!text.trim().is_empty()).then_some(text));
        }

        if !response.text.trim().is_empty() {
            messages.push(Message::assistant(response.text.clone()));
            last_text = response.text;
        }

        for call in &response.tool_calls {
            let outcome = {
                let _awaiting = StateGuard::enter(&shared.state, SessionState::AwaitingTool);
                shared.registry.execute(call, &shared.tool_context()).await
            };
            match &outcome {
                Ok(value) => info!(
                    session = %shared.id,
                    step,
                    tool = %call.name,
                    result = %preview(&value_text(value)),
                    "tool succeeded"
                ),
                Err(err) => warn!(session = %shared.id, step, tool = %call.name, error = %err, "tool failed"),
            }
            let message = {
                let mut conversation = shared.conversation.lock().await;
                match &outcome {
                    Ok(value) => conversation.add_tool_result(Ok(value)),
                    Err(err) => conversation.add_tool_result(Err(err.to_string().as_str())),
                }
            };
            messages.push(message);
        }
    }

    info!(session = %shared.id, max_steps = shared.settings.max_steps, "step limit reached");
    Ok((!last_text.trim().is_empty()).then_some(last_text))
}

async fn call_backend(
    shared: &Shared,
    messages: &[Message],
    tools: &[ToolDefinition],
) -> Result<BackendResponse, SchedulerError<AiError>> {
    let backend = shared.deps.backend.as_ref();
    let system_prompt = shared.settings.system_prompt.as_str();
    let response = shared
        .deps
        .scheduler
        .schedule_with_retry(
            move || backend.generate(messages, tools, system_prompt),
            &shared.settings.retry,
            |position| shared.send(queue_notice(position)),
            |notice| shared.send(retry_notice(&notice)),
        )
        .await?;
    shared.tracker().record(backend.name(), &response.usage);
    Ok(response)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn log_step(shared: &Shared, step: usize, response: &BackendResponse) {
    let tool_names: Vec<&str> = response.tool_calls.iter().map(|c| c.name.as_str()).collect();
    info!(
        session = %shared.id,
        step,
        tool_calls = ?tool_names,
        finish_reason = response.finish_reason.as_deref().unwrap_or("none"),
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        "backend step"
    );
    if !response.text.is_empty() {
        debug!(session = %shared.id, step, text = %preview(&response.text), "backend text");
    }
}
