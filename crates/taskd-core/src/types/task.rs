use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TaskUsage, Workspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Trashed,
    Archived,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Trashed
        )
    }
}

/// Why a task is paused. Only `UserRequest` is non-resumable by
/// auto-resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    Capacity,
    Budget,
    UsageLimit,
    SessionLimit,
    UserRequest,
    Dependency,
    SessionError,
}

impl PauseReason {
    pub fn is_resumable_by_auto_resume(self) -> bool {
        !matches!(self, PauseReason::UserRequest)
    }
}

/// How a parent task's subtasks are run relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStrategy {
    Parallel,
    Sequential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub workflow: Vec<String>,
    pub autonomy: String,
    pub priority: Priority,
    pub project_path: String,
    pub status: TaskStatus,
    pub current_stage: Option<String>,
    pub pause_reason: Option<PauseReason>,
    pub resume_attempts: u32,
    pub max_resume_attempts: u32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub parent_task_id: Option<String>,
    pub subtask_ids: Vec<String>,
    pub subtask_strategy: SubtaskStrategy,
    pub depends_on: Vec<String>,
    pub blocked_by: Vec<String>,
    /// Client-supplied pre-task cost/token estimate, checked against the
    /// per-task thresholds at admission time. Distinct from `usage`,
    /// which accrues actual cost as the task runs.
    pub estimated_cost: f64,
    pub estimated_tokens: u64,
    pub usage: TaskUsage,
    pub workspace: Workspace,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    /// Set when a terminal failure occurs; machine-parseable tag such as
    /// `"resume_exhausted"` or `"store_error"`.
    pub failure_reason: Option<String>,
}

impl Task {
    pub fn current_stage_index(&self) -> Option<usize> {
        let stage = self.current_stage.as_deref()?;
        self.workflow.iter().position(|s| s == stage)
    }

    pub fn is_blocked(&self) -> bool {
        !self.blocked_by.is_empty()
    }
}
