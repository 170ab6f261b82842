//! Tools answered in-process: plan management and web search.

use codemate_common::Envelope;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::args::ToolArgs;
use super::registry::ToolContext;
use super::{ToolError, ToolOutcome};

const MAX_SEARCH_RESULTS: usize = 5;

/// Instant-answer search endpoint (DuckDuckGo response format).
#[derive(Debug, Clone)]
pub struct WebSearch {
    client: reqwest::Client,
    url: String,
}

impl WebSearch {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn search(&self, query: &str) -> ToolOutcome {
        debug!(query, "web search");
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http(format!("HTTP {}", status.as_u16())));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Http(e.to_string()))?;
        Ok(summarize_search(query, &body))
    }
}

/// Reduce an instant-answer response to what the backend needs.
pub(crate) fn summarize_search(query: &str, body: &Value) -> Value {
    let text = |key: &str| body[key].as_str().unwrap_or_default().to_string();
    let results: Vec<Value> = body["RelatedTopics"]
        .as_array()
        .map(|topics| {
            topics
                .iter()
                .filter_map(|topic| {
                    let text = topic["Text"].as_str()?;
                    let url = topic["FirstURL"].as_str().unwrap_or_default();
                    Some(json!({ "text": text, "url": url }))
                })
                .take(MAX_SEARCH_RESULTS)
                .collect()
        })
        .unwrap_or_default();
    json!({
        "query": query,
        "heading": text("Heading"),
        "abstract": text("AbstractText"),
        "abstractUrl": text("AbstractURL"),
        "results": results,
    })
}

/// Run a non-delegated tool. Plan mutations push a `plan_data` snapshot.
pub(crate) async fn run(
    args: ToolArgs,
    ctx: &ToolContext<'_>,
    web_search: Option<&WebSearch>,
) -> ToolOutcome {
    match args {
        ToolArgs::CreatePlan { tasks, description } => {
            let (summary, plan) = {
                let mut plans = ctx.plans.lock().await;
                let summary = plans.create_plan(&tasks, description);
                (summary, plans.plan())
            };
            info!(session = %ctx.session_id, plan_id = %summary.plan_id, tasks = summary.total_tasks, "plan created");
            ctx.push(Envelope::plan_data(ctx.session_id.as_str(), plan));
            Ok(json!({
                "success": true,
                "planId": summary.plan_id,
                "totalTasks": summary.total_tasks,
            }))
        }
        ToolArgs::GetPlan {} => {
            let plan = ctx.plans.lock().await.plan();
            serde_json::to_value(plan).map_err(|e| ToolError::Local(e.to_string()))
        }
        ToolArgs::UpdateTask { task_id, status } => {
            let (update, plan) = {
                let mut plans = ctx.plans.lock().await;
                let update = plans
                    .update_task(&task_id, status)
                    .map_err(|e| ToolError::Local(e.to_string()))?;
                (update, plans.plan())
            };
            debug!(session = %ctx.session_id, task_id = %task_id, status = status.as_str(), "task updated");
            ctx.push(Envelope::plan_data(ctx.session_id.as_str(), plan));
            Ok(json!({
                "success": true,
                "taskId": update.task_id,
                "status": update.status,
                "planStatus": update.plan_status,
                "allCompleted": update.all_completed,
            }))
        }
        ToolArgs::UpdatePlanStatus {} => {
            let (status, plan) = {
                let mut plans = ctx.plans.lock().await;
                let status = plans
                    .refresh_status()
                    .map_err(|e| ToolError::Local(e.to_string()))?;
                (status, plans.plan())
            };
            ctx.push(Envelope::plan_data(ctx.session_id.as_str(), plan));
            Ok(json!({ "success": true, "status": status }))
        }
        ToolArgs::WebSearch { query } => match web_search {
            Some(search) => search.search(&query).await,
            None => Err(ToolError::UnknownTool("web_search".into())),
        },
        other => Err(ToolError::Local(format!(
            "{} is not a local tool",
            other.name()
        ))),
    }
}
