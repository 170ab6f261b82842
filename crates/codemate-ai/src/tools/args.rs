//! Typed arguments for every built-in tool, plus an open variant for tools
//! registered at runtime.

use codemate_common::TaskStatus;
use serde::Deserialize;
use serde_json::{json, Value};

use super::definitions::is_builtin;
use super::ToolError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolArgs {
    ReadFile {
        path: String,
    },
    WriteFile {
        path: String,
        content: String,
    },
    Edit {
        path: String,
        old_string: String,
        new_string: String,
    },
    Bash {
        command: String,
        #[serde(default)]
        cwd: Option<String>,
    },
    Glob {
        pattern: String,
        #[serde(default)]
        cwd: Option<String>,
    },
    Grep {
        pattern: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        case_insensitive: Option<bool>,
    },
    WebFetch {
        url: String,
    },
    CreatePlan {
        tasks: Vec<String>,
        #[serde(default)]
        description: Option<String>,
    },
    GetPlan {},
    UpdateTask {
        task_id: String,
        status: TaskStatus,
    },
    UpdatePlanStatus {},
    WebSearch {
        query: String,
    },
    /// A dynamically registered tool; arguments pass through untouched.
    #[serde(skip)]
    Extension { name: String, args: Value },
}

impl ToolArgs {
    /// Parse raw backend arguments for `name`. Non-built-in names become
    /// [`ToolArgs::Extension`]; the caller decides whether such a tool exists.
    pub fn parse(name: &str, args: &Value) -> Result<Self, ToolError> {
        let args = match args {
            Value::Null => json!({}),
            other => other.clone(),
        };
        if !is_builtin(name) {
            return Ok(ToolArgs::Extension {
                name: name.to_string(),
                args,
            });
        }
        serde_json::from_value(json!({ "tool": name, "args": args })).map_err(|e| {
            ToolError::InvalidArgs {
                tool: name.to_string(),
                reason: e.to_string(),
            }
        })
    }

    pub fn name(&self) -> &str {
        match self {
            ToolArgs::ReadFile { .. } => "read_file",
            ToolArgs::WriteFile { .. } => "write_file",
            ToolArgs::Edit { .. } => "edit",
            ToolArgs::Bash { .. } => "bash",
            ToolArgs::Glob { .. } => "glob",
            ToolArgs::Grep { .. } => "grep",
            ToolArgs::WebFetch { .. } => "web_fetch",
            ToolArgs::CreatePlan { .. } => "create_plan",
            ToolArgs::GetPlan {} => "get_plan",
            ToolArgs::UpdateTask { .. } => "update_task",
            ToolArgs::UpdatePlanStatus {} => "update_plan_status",
            ToolArgs::WebSearch { .. } => "web_search",
            ToolArgs::Extension { name, .. } => name,
        }
    }

    /// Whether the remote executor has to run this call.
    pub fn is_delegated(&self) -> bool {
        matches!(
            self,
            ToolArgs::ReadFile { .. }
                | ToolArgs::WriteFile { .. }
                | ToolArgs::Edit { .. }
                | ToolArgs::Bash { .. }
                | ToolArgs::Glob { .. }
                | ToolArgs::Grep { .. }
                | ToolArgs::WebFetch { .. }
                | ToolArgs::Extension { .. }
        )
    }
}
