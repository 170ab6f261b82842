//! Per-connection sessions.
//!
//! A `Session` owns the conversation, the plan, the tool registry and the
//! pending tool calls of one client. It turns user inputs into backend
//! turns and routes tool results back to the call waiting on them.

mod chat;
mod commands;
mod manager;
mod types;

#[cfg(test)]
mod tests;

pub use manager::Session;
pub use types::{Outbox, SessionDeps, SessionSettings, SessionState};
