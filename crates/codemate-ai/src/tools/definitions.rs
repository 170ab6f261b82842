//! Built-in tool definitions exposed to the backend.

use serde_json::json;

use crate::ToolDefinition;

/// Tools the remote executor runs on the user's machine.
pub const DELEGATED_TOOLS: &[&str] = &[
    "read_file",
    "write_file",
    "edit",
    "bash",
    "glob",
    "grep",
    "web_fetch",
];

/// Tools the server answers in-process.
pub const LOCAL_TOOLS: &[&str] = &[
    "create_plan",
    "get_plan",
    "update_task",
    "update_plan_status",
    "web_search",
];

pub fn is_builtin(name: &str) -> bool {
    DELEGATED_TOOLS.contains(&name) || LOCAL_TOOLS.contains(&name)
}

fn tool(name: &str, description: &str, parameters: serde_json::Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

pub fn delegated_tools() -> Vec<ToolDefinition> {
    vec![
        tool(
            "read_file",
            "Read file contents. Returns {content, size}.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path to the file" }
                },
                "required": ["path"]
            }),
        ),
        tool(
            "write_file",
            "Write file contents, creating the file if needed. Returns {bytesWritten}.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path to the file" },
                    "content": { "type": "string", "description": "Content to write" }
                },
                "required": ["path", "content"]
            }),
        ),
        tool(
            "edit",
            "Edit a file by replacing old_string with new_string. The file must have been \
             read first and old_string must match verbatim. Returns {replacements}.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path to the file" },
                    "old_string": { "type": "string", "description": "Exact text to replace" },
                    "new_string": { "type": "string", "description": "Replacement text" }
                },
                "required": ["path", "old_string", "new_string"]
            }),
        ),
        tool(
            "bash",
            "Execute a bash command. Returns {stdout, stderr}.",
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "The command to run" },
                    "cwd": { "type": "string", "description": "Working directory" }
                },
                "required": ["command"]
            }),
        ),
        tool(
            "glob",
            "List files matching a glob pattern. Returns {files}.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Glob pattern, e.g. '**/*.rs'" },
                    "cwd": { "type": "string", "description": "Directory to search from" }
                },
                "required": ["pattern"]
            }),
        ),
        tool(
            "grep",
            "Search file contents for a regex pattern. Returns {matches}.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Regex pattern" },
                    "path": { "type": "string", "description": "File or directory to search" },
                    "case_insensitive": { "type": "boolean", "description": "Ignore case" }
                },
                "required": ["pattern"]
            }),
        ),
        tool(
            "web_fetch",
            "Fetch content from a URL. Returns {status, contentType, content}.",
            json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "URL to fetch" }
                },
                "required": ["url"]
            }),
        ),
    ]
}

pub fn plan_tools() -> Vec<ToolDefinition> {
    vec![
        tool(
            "create_plan",
            "Create a new plan with tasks, replacing the current plan.",
            json!({
                "type": "object",
                "properties": {
                    "tasks": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Task descriptions in execution order"
                    },
                    "description": { "type": "string", "description": "What the plan achieves" }
                },
                "required": ["tasks"]
            }),
        ),
        tool(
            "get_plan",
            "Get the current plan. An empty task list means there is no active plan.",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "update_task",
            "Update the status of one task in the current plan.",
            json!({
                "type": "object",
                "properties": {
                    "task_id": { "type": "string", "description": "Task id from the plan" },
                    "status": {
                        "type": "string",
                        "enum": ["pending", "in_progress", "completed"],
                        "description": "New status"
                    }
                },
                "required": ["task_id", "status"]
            }),
        ),
        tool(
            "update_plan_status",
            "Recompute the plan status from task completion.",
            json!({ "type": "object", "properties": {} }),
        ),
    ]
}

pub fn web_search_tool() -> ToolDefinition {
    tool(
        "web_search",
        "Search the web for a query. Returns an abstract and related results.",
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        }),
    )
}

/// Convert a tool definition to the Gemini API format.
pub fn to_gemini_tool(tool: &ToolDefinition) -> serde_json::Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}

/// Append a `Parameters: name (type, required): description, ...` summary so
/// backends that ignore schemas still see the argument contract.
pub fn describe_parameters(def: &ToolDefinition) -> String {
    let Some(props) = def.parameters["properties"].as_object() else {
        return def.description.clone();
    };
    if props.is_empty() {
        return def.description.clone();
    }
    let required: Vec<&str> = def.parameters["required"]
        .as_array()
        .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    let params: Vec<String> = props
        .iter()
        .map(|(name, prop)| {
            let kind = prop["type"].as_str().unwrap_or("any");
            let need = if required.contains(&name.as_str()) {
                "required"
            } else {
                "optional"
            };
            let desc = prop["description"].as_str().unwrap_or("");
            format!("{name} ({kind}, {need}): {desc}")
        })
        .collect();
    format!("{} Parameters: {}", def.description, params.join(", "))
        .trim_start()
        .to_string()
}
