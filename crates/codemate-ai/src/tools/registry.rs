//! Per-session set of callable tools and the dispatch from a backend tool
//! call to its local or delegated execution.

use std::time::Duration;

use codemate_common::{Envelope, SessionId, ToolId};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::args::ToolArgs;
use super::coordinator::ToolCoordinator;
use super::definitions::{delegated_tools, describe_parameters, is_builtin, plan_tools, web_search_tool};
use super::local::{self, WebSearch};
use super::schema::validate_args;
use super::{ToolError, ToolOutcome};
use crate::plan::PlanStore;
use crate::session::Outbox;
use crate::{ToolCall, ToolDefinition};

/// Everything a tool call may touch while it runs.
pub struct ToolContext<'a> {
    pub session_id: &'a SessionId,
    pub outbox: &'a Outbox,
    pub coordinator: &'a ToolCoordinator,
    pub plans: &'a Mutex<PlanStore>,
    /// Limit for delegated calls; `None` waits until cancelled.
    pub timeout: Option<Duration>,
}

impl ToolContext<'_> {
    /// Queue an envelope for the client. A closed outbox means the
    /// connection is gone and the worker is about to be aborted.
    pub(crate) fn push(&self, envelope: Envelope) -> bool {
        if self.outbox.send(envelope).is_err() {
            debug!(session = %self.session_id, "outbox closed, envelope dropped");
            return false;
        }
        true
    }
}

pub struct ToolRegistry {
    builtin: Vec<ToolDefinition>,
    extensions: RwLock<Vec<ToolDefinition>>,
    web_search: Option<WebSearch>,
}

impl ToolRegistry {
    /// Built-in tools, plus `web_search` when an endpoint is given.
    pub fn new(web_search_url: Option<&str>) -> Self {
        let mut builtin = delegated_tools();
        builtin.extend(plan_tools());
        let web_search = web_search_url.map(WebSearch::new);
        if web_search.is_some() {
            builtin.push(web_search_tool());
        }
        Self {
            builtin,
            extensions: RwLock::new(Vec::new()),
            web_search,
        }
    }

    /// Merge client-announced tools. Built-in names are skipped, an existing
    /// extension with the same name is replaced. Returns how many were taken.
    pub async fn register_extensions(&self, tools: Vec<ToolDefinition>) -> usize {
        let mut extensions = self.extensions.write().await;
        let mut accepted = 0;
        for mut def in tools {
            if def.name.trim().is_empty() {
                warn!("ignoring tool registration without a name");
                continue;
            }
            if is_builtin(&def.name) {
                warn!(tool = %def.name, "registration would shadow a built-in tool, ignored");
                continue;
            }
            if def.parameters.is_null() {
                def.parameters = json!({ "type": "object", "properties": {} });
            }
            def.description = describe_parameters(&def);
            match extensions.iter_mut().find(|t| t.name == def.name) {
                Some(existing) => *existing = def,
                None => extensions.push(def),
            }
            accepted += 1;
        }
        info!(accepted, total = extensions.len(), "extension tools registered");
        accepted
    }

    /// Definitions offered to the backend: built-ins first, then extensions.
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        let mut all = self.builtin.clone();
        all.extend(self.extensions.read().await.iter().cloned());
        all
    }

    async fn definition(&self, name: &str) -> Option<ToolDefinition> {
        if let Some(def) = self.builtin.iter().find(|t| t.name == name) {
            return Some(def.clone());
        }
        self.extensions
            .read()
            .await
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }

    /// Validate and run one backend tool call.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext<'_>) -> ToolOutcome {
        let args = match &call.arguments {
            Value::Null => json!({}),
            other => other.clone(),
        };
        let def = self
            .definition(&call.name)
            .await
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        validate_args(&def.parameters, &args).map_err(|reason| ToolError::InvalidArgs {
            tool: call.name.clone(),
            reason,
        })?;

        let parsed = ToolArgs::parse(&call.name, &args)?;
        if parsed.is_delegated() {
            self.delegate(&call.name, args, ctx).await
        } else {
            debug!(session = %ctx.session_id, tool = %call.name, "running local tool");
            local::run(parsed, ctx, self.web_search.as_ref()).await
        }
    }

    async fn delegate(&self, name: &str, args: Value, ctx: &ToolContext<'_>) -> ToolOutcome {
        let tool_id = ToolId::new();
        let pending = ctx
            .coordinator
            .create_pending(tool_id.clone())
            .map_err(|e| ToolError::Local(e.to_string()))?;

        info!(session = %ctx.session_id, tool = %name, tool_id = %tool_id, "delegating tool call");
        if !ctx.push(Envelope::tool_call(tool_id.as_str(), name, args)) {
            ctx.coordinator.forget(&tool_id);
            return Err(ToolError::Cancelled("connection closed".into()));
        }
        ctx.coordinator.wait(pending, ctx.timeout).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemate_common::{MessageType, Payload, PlanStatus, TaskStatus, ToolResultPayload};
    use tokio::sync::mpsc;

    struct Harness {
        session_id: SessionId,
        outbox: Outbox,
        coordinator: ToolCoordinator,
        plans: Mutex<PlanStore>,
    }

    impl Harness {
        fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
            let (outbox, rx) = mpsc::unbounded_channel();
            let harness = Self {
                session_id: SessionId::new(),
                outbox,
                coordinator: ToolCoordinator::new(),
                plans: Mutex::new(PlanStore::new()),
            };
            (harness, rx)
        }

        fn ctx(&self, timeout: Option<Duration>) -> ToolContext<'_> {
            ToolContext {
                session_id: &self.session_id,
                outbox: &self.outbox,
                coordinator: &self.coordinator,
                plans: &self.plans,
                timeout,
            }
        }
    }

    const FIVE_SECS: Option<Duration> = Some(Duration::from_secs(5));

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "c1".into(),
            name: name.into(),
            arguments,
        }
    }

    #[tokio::test]
    async fn unknown_tool_fails() {
        let registry = ToolRegistry::default();
        let (h, _rx) = Harness::new();
        let outcome = registry.execute(&call("teleport", json!({})), &h.ctx(FIVE_SECS)).await;
        assert_eq!(outcome, Err(ToolError::UnknownTool("teleport".into())));
    }

    #[tokio::test]
    async fn schema_failure_is_reported_before_dispatch() {
        let registry = ToolRegistry::default();
        let (h, mut rx) = Harness::new();
        let outcome = registry
            .execute(&call("read_file", json!({ "path": 3 })), &h.ctx(FIVE_SECS))
            .await;
        assert!(matches!(outcome, Err(ToolError::InvalidArgs { ref tool, .. }) if tool == "read_file"));
        assert!(rx.try_recv().is_err());
        assert_eq!(h.coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn delegated_call_round_trips_through_coordinator() {
        let registry = ToolRegistry::default();
        let (h, mut rx) = Harness::new();
        let coordinator = &h.coordinator;

        let executor = async {
            let envelope = rx.recv().await.unwrap();
            let Payload::ToolCall(tool_call) = envelope.payload else {
                panic!("expected tool_call, got {:?}", envelope.payload);
            };
            assert_eq!(tool_call.name, "glob");
            assert_eq!(tool_call.args, json!({ "pattern": "*" }));
            let id = ToolId::from(tool_call.tool_id.as_str());
            assert!(coordinator.resolve(
                &id,
                &ToolResultPayload::success(tool_call.tool_id.clone(), json!({ "files": ["a.txt"] }))
            ));
        };
        let ctx = h.ctx(None);
        let glob = call("glob", json!({ "pattern": "*" }));
        let (outcome, ()) = tokio::join!(registry.execute(&glob, &ctx), executor);
        assert_eq!(outcome, Ok(json!({ "files": ["a.txt"] })));
        assert_eq!(h.coordinator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delegated_call_times_out() {
        let registry = ToolRegistry::default();
        let (h, _rx) = Harness::new();
        let outcome = registry
            .execute(&call("bash", json!({ "command": "sleep 999" })), &h.ctx(FIVE_SECS))
            .await;
        assert!(matches!(outcome, Err(ToolError::Timeout { .. })));
        assert_eq!(h.coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn closed_outbox_cancels_delegation() {
        let registry = ToolRegistry::default();
        let (h, rx) = Harness::new();
        drop(rx);
        let outcome = registry
            .execute(&call("read_file", json!({ "path": "a" })), &h.ctx(None))
            .await;
        assert_eq!(outcome, Err(ToolError::Cancelled("connection closed".into())));
        assert_eq!(h.coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn plan_tools_push_snapshots() {
        let registry = ToolRegistry::default();
        let (h, mut rx) = Harness::new();

        let created = registry
            .execute(&call("create_plan", json!({ "tasks": ["read", "fix"] })), &h.ctx(FIVE_SECS))
            .await
            .unwrap();
        assert_eq!(created["totalTasks"], 2);
        let Payload::PlanData(data) = rx.try_recv().unwrap().payload else {
            panic!("expected plan_data");
        };
        assert_eq!(data.session_id, h.session_id.as_str());
        assert_eq!(data.plan.tasks.len(), 2);

        let task_id = data.plan.tasks[0].id.clone();
        let updated = registry
            .execute(
                &call("update_task", json!({ "task_id": task_id, "status": "completed" })),
                &h.ctx(FIVE_SECS),
            )
            .await
            .unwrap();
        assert_eq!(updated["planStatus"], "in_progress");
        assert_eq!(updated["allCompleted"], false);
        assert!(matches!(rx.try_recv().unwrap().payload, Payload::PlanData(_)));

        let plan = registry
            .execute(&call("get_plan", Value::Null), &h.ctx(FIVE_SECS))
            .await
            .unwrap();
        assert_eq!(plan["tasks"][0]["status"], "completed");
        // Reads do not notify.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn update_unknown_task_fails_without_snapshot() {
        let registry = ToolRegistry::default();
        let (h, mut rx) = Harness::new();
        registry
            .execute(&call("create_plan", json!({ "tasks": ["one"] })), &h.ctx(FIVE_SECS))
            .await
            .unwrap();
        let _ = rx.try_recv();
        let before = h.plans.lock().await.plan();

        let outcome = registry
            .execute(
                &call("update_task", json!({ "task_id": "missing", "status": "completed" })),
                &h.ctx(FIVE_SECS),
            )
            .await;
        assert_eq!(outcome, Err(ToolError::Local("task not found: missing".into())));
        assert!(rx.try_recv().is_err());
        assert_eq!(h.plans.lock().await.plan(), before);
    }

    #[tokio::test]
    async fn get_plan_without_plan_is_empty() {
        let registry = ToolRegistry::default();
        let (h, _rx) = Harness::new();
        let plan = registry
            .execute(&call("get_plan", json!({})), &h.ctx(FIVE_SECS))
            .await
            .unwrap();
        assert_eq!(plan["tasks"], json!([]));
        assert_eq!(plan["status"], "pending");
    }

    #[tokio::test]
    async fn update_plan_status_recomputes() {
        let registry = ToolRegistry::default();
        let (h, _rx) = Harness::new();
        assert!(registry
            .execute(&call("update_plan_status", json!({})), &h.ctx(FIVE_SECS))
            .await
            .is_err());

        registry
            .execute(&call("create_plan", json!({ "tasks": ["only"] })), &h.ctx(FIVE_SECS))
            .await
            .unwrap();
        let task_id = h.plans.lock().await.plan().tasks[0].id.clone();
        h.plans
            .lock()
            .await
            .update_task(&task_id, TaskStatus::Completed)
            .unwrap();

        let result = registry
            .execute(&call("update_plan_status", json!({})), &h.ctx(FIVE_SECS))
            .await
            .unwrap();
        assert_eq!(result["status"], "completed");
        assert_eq!(h.plans.lock().await.plan().status, PlanStatus::Completed);
    }

    #[tokio::test]
    async fn web_search_only_when_configured() {
        let without = ToolRegistry::default();
        assert!(!without.definitions().await.iter().any(|t| t.name == "web_search"));
        let (h, _rx) = Harness::new();
        let outcome = without
            .execute(&call("web_search", json!({ "query": "rust" })), &h.ctx(FIVE_SECS))
            .await;
        assert_eq!(outcome, Err(ToolError::UnknownTool("web_search".into())));

        let with = ToolRegistry::new(Some("https://api.duckduckgo.com/"));
        assert!(with.definitions().await.iter().any(|t| t.name == "web_search"));
    }

    #[tokio::test]
    async fn extensions_never_shadow_builtins() {
        let registry = ToolRegistry::default();
        let accepted = registry
            .register_extensions(vec![
                ToolDefinition {
                    name: "bash".into(),
                    description: "evil bash".into(),
                    parameters: json!({ "type": "object", "properties": {} }),
                },
                ToolDefinition {
                    name: "lookup".into(),
                    description: "Look things up.".into(),
                    parameters: json!({
                        "type": "object",
                        "properties": { "q": { "type": "string", "description": "query" } },
                        "required": ["q"]
                    }),
                },
            ])
            .await;
        assert_eq!(accepted, 1);

        let defs = registry.definitions().await;
        let bash: Vec<_> = defs.iter().filter(|t| t.name == "bash").collect();
        assert_eq!(bash.len(), 1);
        assert_ne!(bash[0].description, "evil bash");

        let lookup = defs.iter().find(|t| t.name == "lookup").unwrap();
        assert_eq!(
            lookup.description,
            "Look things up. Parameters: q (string, required): query"
        );
    }

    #[tokio::test]
    async fn re_registration_replaces_extension() {
        let registry = ToolRegistry::default();
        let def = |desc: &str| ToolDefinition {
            name: "lookup".into(),
            description: desc.into(),
            parameters: json!({ "type": "object", "properties": {} }),
        };
        registry.register_extensions(vec![def("first")]).await;
        registry.register_extensions(vec![def("second")]).await;

        let defs = registry.definitions().await;
        let lookups: Vec<_> = defs.iter().filter(|t| t.name == "lookup").collect();
        assert_eq!(lookups.len(), 1);
        assert_eq!(lookups[0].description, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn extension_calls_are_delegated_and_validated() {
        let registry = ToolRegistry::default();
        registry
            .register_extensions(vec![ToolDefinition {
                name: "lookup".into(),
                description: String::new(),
                parameters: json!({
                    "type": "object",
                    "properties": { "q": { "type": "string" } },
                    "required": ["q"]
                }),
            }])
            .await;
        let (h, mut rx) = Harness::new();

        let invalid = registry.execute(&call("lookup", json!({})), &h.ctx(FIVE_SECS)).await;
        assert!(matches!(invalid, Err(ToolError::InvalidArgs { .. })));

        // Nobody answers, so the call times out after being sent.
        let outcome = registry
            .execute(&call("lookup", json!({ "q": "x" })), &h.ctx(FIVE_SECS))
            .await;
        assert!(matches!(outcome, Err(ToolError::Timeout { .. })));
        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.message_type(), MessageType::ToolCall);
    }
}
