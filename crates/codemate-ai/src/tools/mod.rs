//! Tools the backend can call.
//!
//! Most tools run on the user's machine: the session sends a `tool_call`
//! envelope and the [`ToolCoordinator`] parks the generation loop until the
//! matching `tool_result` arrives. Plan tools and web search are answered
//! in-process. Clients can register extra tools at runtime; those always take
//! the delegated path.

mod args;
mod coordinator;
mod definitions;
mod local;
mod registry;
mod schema;

use std::time::Duration;

use codemate_common::ToolId;

pub use args::ToolArgs;
pub use coordinator::{CoordinatorError, PendingTool, ToolCoordinator};
pub use definitions::{
    delegated_tools, describe_parameters, is_builtin, plan_tools, to_gemini_tool,
    web_search_tool, DELEGATED_TOOLS, LOCAL_TOOLS,
};
pub use local::WebSearch;
pub use registry::{ToolContext, ToolRegistry};
pub use schema::validate_args;

/// Why a tool call produced no result. Every variant is reported back to the
/// backend as a failed tool turn; none of them ends the session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArgs { tool: String, reason: String },
    /// The remote executor ran the tool and reported a failure.
    #[error("{0}")]
    Executor(String),
    #[error("Tool call {tool_id} timed out after {}s", .after.as_secs())]
    Timeout { tool_id: ToolId, after: Duration },
    #[error("Tool call cancelled: {0}")]
    Cancelled(String),
    #[error("Invalid tool result: {0}")]
    Protocol(String),
    #[error("{0}")]
    Local(String),
    #[error("Web search failed: {0}")]
    Http(String),
}

pub type ToolOutcome = Result<serde_json::Value, ToolError>;
