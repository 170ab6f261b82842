//! Slash commands: `/clear` and `/compact`.

use codemate_common::{Command, Envelope};
use tracing::{info, warn};

use crate::Message;

use super::chat::{queue_notice, retry_notice};
use super::manager::Shared;

const COMPACT_INSTRUCTION: &str = "Summarize the conversation so far in a few short \
paragraphs. Keep file paths, decisions, open tasks and anything the user asked to \
remember. Reply with the summary only.";

pub(super) async fn clear(shared: &Shared) {
    shared.conversation.lock().await.clear();
    info!(session = %shared.id, "conversation cleared");
    shared.send(Envelope::command(Command::Clear));
    shared.send(Envelope::llm_response("✅ Conversation cleared"));
}

/// Ask the backend for a summary of the visible history and replace the
/// summarized messages with it. Messages added while the summary is being
/// generated are kept after it.
pub(super) async fn compact(shared: &Shared) {
    let (history, mark) = {
        let conversation = shared.conversation.lock().await;
        (conversation.history(), conversation.mark())
    };
    if history.is_empty() {
        shared.send(Envelope::llm_response("Nothing to compact"));
        return;
    }

    let outcome = match summarize(shared, history).await {
        Ok(summary) => {
            if shared.conversation.lock().await.compact(&summary, mark) {
                info!(session = %shared.id, summary_chars = summary.len(), "conversation compacted");
                Ok(())
            } else {
                Err("conversation was cleared while summarizing".to_string())
            }
        }
        Err(reason) => Err(reason),
    };

    match outcome {
        Ok(()) => {
            shared.send(Envelope::command(Command::Compact));
            shared.send(Envelope::llm_response("✅ Conversation compacted"));
        }
        Err(reason) => {
            warn!(session = %shared.id, %reason, "compaction failed");
            shared.send(Envelope::error(
                format!("Failed to compact conversation: {reason}"),
                Some("compact_failed"),
            ));
        }
    }
}

pub(super) fn unknown(shared: &Shared, name: &str) {
    let name = name.trim_start_matches('/');
    shared.send(Envelope::error(
        format!("Unknown command: /{name}"),
        Some("unknown_command"),
    ));
}

async fn summarize(shared: &Shared, mut history: Vec<Message>) -> Result<String, String> {
    history.push(Message::user(COMPACT_INSTRUCTION));
    let messages: &[Message] = &history;
    let backend = shared.deps.backend.as_ref();
    let system_prompt = shared.settings.system_prompt.as_str();

    let response = shared
        .deps
        .scheduler
        .schedule_with_retry(
            move || backend.generate(messages, &[], system_prompt),
            &shared.settings.retry,
            |position| shared.send(queue_notice(position)),
            |notice| shared.send(retry_notice(&notice)),
        )
        .await
        .map_err(|e| e.to_string())?;

    shared.tracker().record(backend.name(), &response.usage);
    let summary = response.text.trim();
    if summary.is_empty() {
        return Err("backend returned an empty summary".into());
    }
    Ok(summary.to_string())
}
