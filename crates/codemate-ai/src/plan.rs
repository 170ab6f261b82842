//! Per-session plan: a checklist the backend maintains while it works.

use codemate_common::{new_id, Plan, PlanStatus, Task, TaskStatus};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("no active plan")]
    NoActivePlan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub plan_id: String,
    pub total_tasks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub task_id: String,
    pub status: TaskStatus,
    pub plan_status: PlanStatus,
    pub all_completed: bool,
}

/// Aggregate status derived from task statuses.
///
/// `completed` needs at least one task and every task completed;
/// `in_progress` covers any started task or a partial completion.
pub fn derive_status(tasks: &[Task]) -> PlanStatus {
    if tasks.is_empty() {
        return PlanStatus::Pending;
    }
    let completed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    if completed == tasks.len() {
        PlanStatus::Completed
    } else if completed > 0 || tasks.iter().any(|t| t.status == TaskStatus::InProgress) {
        PlanStatus::InProgress
    } else {
        PlanStatus::Pending
    }
}

#[derive(Debug, Default)]
pub struct PlanStore {
    plan: Option<Plan>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any existing plan with a fresh one, every task pending.
    pub fn create_plan(&mut self, descriptions: &[String], description: Option<String>) -> PlanSummary {
        let tasks: Vec<Task> = descriptions
            .iter()
            .map(|d| Task {
                id: new_id(),
                description: d.clone(),
                status: TaskStatus::Pending,
            })
            .collect();
        let plan = Plan {
            id: new_id(),
            description,
            status: PlanStatus::Pending,
            tasks,
        };
        let summary = PlanSummary {
            plan_id: plan.id.clone(),
            total_tasks: plan.tasks.len(),
        };
        self.plan = Some(plan);
        summary
    }

    /// Current plan snapshot, or an empty pending plan when none exists.
    pub fn plan(&self) -> Plan {
        self.plan.clone().unwrap_or_else(Plan::empty)
    }

    pub fn has_plan(&self) -> bool {
        self.plan.is_some()
    }

    pub fn update_task(&mut self, task_id: &str, status: TaskStatus) -> Result<TaskUpdate, PlanError> {
        let plan = self
            .plan
            .as_mut()
            .ok_or_else(|| PlanError::TaskNotFound(task_id.to_string()))?;
        let task = plan
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| PlanError::TaskNotFound(task_id.to_string()))?;
        task.status = status;
        plan.status = derive_status(&plan.tasks);
        Ok(TaskUpdate {
            task_id: task_id.to_string(),
            status,
            plan_status: plan.status,
            all_completed: plan.status == PlanStatus::Completed,
        })
    }

    /// Recompute the aggregate status from the tasks.
    pub fn refresh_status(&mut self) -> Result<PlanStatus, PlanError> {
        let plan = self.plan.as_mut().ok_or(PlanError::NoActivePlan)?;
        plan.status = derive_status(&plan.tasks);
        Ok(plan.status)
    }
}
