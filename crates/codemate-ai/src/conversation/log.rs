//! Best-effort JSON Lines mirror of a session's conversation.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::Role;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum LogRecord<'a> {
    Append {
        role: Role,
        content: &'a str,
        timestamp: i64,
    },
    Compact {
        summary: &'a str,
        /// Number of leading messages the summary replaced.
        replaced: usize,
        timestamp: i64,
    },
    Clear {
        timestamp: i64,
    },
}

/// Appends one JSON object per mutation to `<dir>/<session_id>.jsonl`.
///
/// The file is opened once, when the log is created. If that fails the log
/// stays disabled for the rest of the session.
#[derive(Debug)]
pub struct ConversationLog {
    path: PathBuf,
    file: Option<File>,
}

impl ConversationLog {
    pub fn new(dir: &Path, session_id: &str) -> Self {
        let path = dir.join(format!("{session_id}.jsonl"));
        let file = match open_append(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %path.display(), "conversation log disabled: {e}");
                None
            }
        };
        Self { path, file }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Write failures are logged and swallowed.
    pub(crate) fn write(&self, record: &LogRecord<'_>) {
        let Some(file) = &self.file else {
            return;
        };
        let result = serde_json::to_string(record)
            .map_err(std::io::Error::from)
            .and_then(|mut line| {
                line.push('\n');
                (&*file).write_all(line.as_bytes())
            });
        if let Err(e) = result {
            warn!(path = %self.path.display(), "conversation log write failed: {e}");
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
