//! Per-session conversation log and the window projected to the backend.

mod log;

pub use self::log::ConversationLog;

use serde_json::Value;

use crate::{Message, Role};
use self::log::LogRecord;

pub const DEFAULT_HISTORY_WINDOW: usize = 20;

const SUMMARY_PREFIX: &str = "[Previous conversation summary]: ";

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Ordered message log owned by one session.
#[derive(Debug)]
pub struct ConversationStore {
    messages: Vec<ConversationMessage>,
    window: usize,
    /// Bumped by every clear or compaction.
    epoch: u64,
    log: Option<ConversationLog>,
}

/// Snapshot position taken before a compaction summary is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    epoch: u64,
    len: usize,
}

impl ConversationStore {
    pub fn new(window: usize) -> Self {
        Self {
            messages: Vec::new(),
            window: window.max(1),
            epoch: 0,
            log: None,
        }
    }

    pub fn with_log(mut self, log: ConversationLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(Role::User, content.into());
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content.into());
    }

    /// Internal note kept in the log but never sent to the backend.
    pub fn add_system_note(&mut self, content: impl Into<String>) {
        self.push(Role::System, content.into());
    }

    /// Record a tool outcome as a user turn the backend should react to.
    /// Returns the message so the caller can extend an in-flight request.
    pub fn add_tool_result(&mut self, outcome: Result<&Value, &str>) -> Message {
        let content = tool_result_text(outcome);
        self.push(Role::User, content.clone());
        Message::user(content)
    }

    /// The most recent `window` user/assistant messages, oldest first.
    pub fn history(&self) -> Vec<Message> {
        let visible: Vec<&ConversationMessage> = self
            .messages
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .collect();
        let skip = visible.len().saturating_sub(self.window);
        visible
            .into_iter()
            .skip(skip)
            .map(|m| Message {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    /// Position of the log right now, for a later [`compact`](Self::compact).
    pub fn mark(&self) -> Mark {
        Mark {
            epoch: self.epoch,
            len: self.messages.len(),
        }
    }

    /// Replace the messages that existed at `mark` with a single summary,
    /// keeping anything appended since behind it.
    ///
    /// Returns false and leaves the log untouched when it was cleared or
    /// compacted after `mark` was taken.
    pub fn compact(&mut self, summary: &str, mark: Mark) -> bool {
        if mark.epoch != self.epoch || mark.len > self.messages.len() {
            return false;
        }
        let timestamp = now_ms();
        let tail = self.messages.split_off(mark.len);
        self.messages = Vec::with_capacity(tail.len() + 1);
        self.messages.push(ConversationMessage {
            role: Role::User,
            content: format!("{SUMMARY_PREFIX}{summary}"),
            timestamp,
        });
        self.messages.extend(tail);
        self.epoch += 1;
        if let Some(log) = &self.log {
            log.write(&LogRecord::Compact {
                summary,
                replaced: mark.len,
                timestamp,
            });
        }
        true
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.epoch += 1;
        if let Some(log) = &self.log {
            log.write(&LogRecord::Clear {
                timestamp: now_ms(),
            });
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    fn push(&mut self, role: Role, content: String) {
        let timestamp = now_ms();
        if let Some(log) = &self.log {
            log.write(&LogRecord::Append {
                role,
                content: &content,
                timestamp,
            });
        }
        self.messages.push(ConversationMessage {
            role,
            content,
            timestamp,
        });
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

pub fn tool_result_text(outcome: Result<&Value, &str>) -> String {
    match outcome {
        Ok(value) => format!("Tool executed successfully. Result: {value}"),
        Err(error) => format!("Tool execution failed: {error}"),
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_is_last_twenty_in_order() {
        let mut store = ConversationStore::default();
        for i in 0..25 {
            store.add_user_message(format!("msg {i}"));
        }
        let history = store.history();
        assert_eq!(history.len(), 20);
        assert_eq!(history[0].content, "msg 5");
        assert_eq!(history[19].content, "msg 24");
        assert_eq!(store.len(), 25);
    }

    #[test]
    fn history_skips_system_notes() {
        let mut store = ConversationStore::new(3);
        store.add_user_message("a");
        store.add_assistant_message("b");
        store.add_system_note("bookkeeping");
        store.add_user_message("c");
        store.add_system_note("more bookkeeping");

        let history = store.history();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
        assert!(history.iter().all(|m| m.role != Role::System));
    }

    #[test]
    fn tool_results_are_user_turns() {
        let mut store = ConversationStore::default();
        let ok = store.add_tool_result(Ok(&json!({ "files": ["a.txt"] })));
        let failed = store.add_tool_result(Err("permission denied"));

        assert_eq!(ok.role, Role::User);
        assert_eq!(
            ok.content,
            r#"Tool executed successfully. Result: {"files":["a.txt"]}"#
        );
        assert_eq!(failed.content, "Tool execution failed: permission denied");
        assert_eq!(store.history().len(), 2);
    }

    #[test]
    fn compact_replaces_everything() {
        let mut store = ConversationStore::default();
        store.add_user_message("hello");
        store.add_assistant_message("hi");

        assert!(store.compact("greeted each other", store.mark()));
        let history = store.history();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].content,
            "[Previous conversation summary]: greeted each other"
        );

        assert!(store.compact("second summary", store.mark()));
        let history = store.history();
        assert_eq!(history.len(), 1);
        assert!(history[0].content.contains("second summary"));
        assert!(!history[0].content.contains("greeted"));
    }

    #[test]
    fn compact_keeps_messages_added_after_mark() {
        let mut store = ConversationStore::default();
        store.add_user_message("hello");
        store.add_assistant_message("hi");
        let mark = store.mark();

        // A turn finishes while the summary is being generated.
        store.add_user_message("list files");
        store.add_assistant_message("a.txt");

        assert!(store.compact("greeted each other", mark));
        let contents: Vec<_> = store.history().into_iter().map(|m| m.content).collect();
        assert_eq!(
            contents,
            vec![
                "[Previous conversation summary]: greeted each other",
                "list files",
                "a.txt",
            ]
        );
    }

    #[test]
    fn stale_mark_is_refused() {
        let mut store = ConversationStore::default();
        store.add_user_message("hello");
        let mark = store.mark();
        store.clear();
        store.add_user_message("fresh start");

        assert!(!store.compact("old summary", mark));
        assert_eq!(store.history()[0].content, "fresh start");

        let mark = store.mark();
        assert!(store.compact("first", mark));
        assert!(!store.compact("second", mark));
    }

    #[test]
    fn clear_empties_log() {
        let mut store = ConversationStore::default();
        store.add_user_message("hello");
        store.clear();
        assert!(store.is_empty());
        assert!(store.history().is_empty());
    }

    #[test]
    fn log_mirrors_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let log = ConversationLog::new(&dir.path().join("logs"), "session-1");
        let path = log.path().to_path_buf();

        let mut store = ConversationStore::default().with_log(log);
        store.add_user_message("hello");
        store.add_assistant_message("hi");
        store.compact("summary", store.mark());
        store.clear();

        let content = std::fs::read_to_string(path).unwrap();
        let ops: Vec<String> = content
            .lines()
            .map(|line| {
                let value: Value = serde_json::from_str(line).unwrap();
                value["op"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(ops, vec!["append", "append", "compact", "clear"]);
        assert!(content.contains(r#""role":"user""#));
    }

    #[test]
    fn log_failure_does_not_fail_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let log = ConversationLog::new(&blocker, "s");
        assert!(!log.is_enabled());
        let mut store = ConversationStore::default().with_log(log);
        store.add_user_message("still stored");
        assert_eq!(store.history().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn log_file_is_opened_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = ConversationLog::new(dir.path(), "session-2");
        let path = log.path().to_path_buf();
        assert!(log.is_enabled());
        assert!(path.exists());

        // Writes go through the handle opened up front, so the unlinked
        // path is never recreated.
        std::fs::remove_file(&path).unwrap();
        let mut store = ConversationStore::default().with_log(log);
        store.add_user_message("hello");
        assert!(!path.exists());
    }

    #[test]
    fn compact_record_counts_replaced_messages() {
        let dir = tempfile::tempdir().unwrap();
        let log = ConversationLog::new(dir.path(), "session-3");
        let path = log.path().to_path_buf();

        let mut store = ConversationStore::default().with_log(log);
        store.add_user_message("a");
        store.add_assistant_message("b");
        let mark = store.mark();
        store.add_user_message("c");
        assert!(store.compact("summary", mark));

        let content = std::fs::read_to_string(path).unwrap();
        let last: Value = serde_json::from_str(content.lines().last().unwrap()).unwrap();
        assert_eq!(last["op"], "compact");
        assert_eq!(last["replaced"], 2);
    }
}
