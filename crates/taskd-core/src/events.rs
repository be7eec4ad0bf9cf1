//! Event kinds emitted onto the orchestrator's event bus. Defined
//! here, in the pure crate, so the state machine's transition functions
//! can return the exact event a caller must publish without depending on
//! the async bus implementation that lives in `taskd-daemon`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CapacityRestoredEvent, Checkpoint, PauseReason, Task};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DomainEvent {
    #[serde(rename = "task:created")]
    TaskCreated { task_id: String },
    #[serde(rename = "task:started")]
    TaskStarted { task_id: String, stage: String },
    #[serde(rename = "task:stage-changed")]
    TaskStageChanged { task_id: String, from: Option<String>, to: String },
    #[serde(rename = "task:paused")]
    TaskPaused { task_id: String, reason: PauseReason, at: DateTime<Utc> },
    #[serde(rename = "task:session-resumed")]
    TaskSessionResumed { task_id: String, context_summary: String, resume_attempts: u32 },
    #[serde(rename = "task:completed")]
    TaskCompleted { task_id: String },
    #[serde(rename = "task:failed")]
    TaskFailed { task_id: String, error: String, failure_reason: String, stage: Option<String> },
    #[serde(rename = "task:decomposed")]
    TaskDecomposed { task_id: String, subtask_ids: Vec<String> },
    #[serde(rename = "task:trashed")]
    TaskTrashed { task_id: String },
    #[serde(rename = "task:restored")]
    TaskRestored { task_id: String },
    #[serde(rename = "task:archived")]
    TaskArchived { task_id: String },
    #[serde(rename = "task:unarchived")]
    TaskUnarchived { task_id: String },
    #[serde(rename = "subtask:created")]
    SubtaskCreated { parent_id: String, subtask_id: String },
    #[serde(rename = "subtask:completed")]
    SubtaskCompleted { parent_id: String, subtask_id: String },
    #[serde(rename = "subtask:failed")]
    SubtaskFailed { parent_id: String, subtask_id: String },
    #[serde(rename = "usage:updated")]
    UsageUpdated { task_id: String },
    #[serde(rename = "capacity:restored")]
    CapacityRestored(CapacityRestoredEvent),
    #[serde(rename = "tasks:auto-resumed")]
    TasksAutoResumed {
        reason: crate::types::RestoredReason,
        resumed_count: u32,
        errors: Vec<AutoResumeError>,
        context_summary: String,
    },
    #[serde(rename = "trash:emptied")]
    TrashEmptied { count: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoResumeError {
    pub task_id: String,
    pub error: String,
}

/// Snapshot used by checkpoint-writing call sites; kept here so both the
/// state machine and the store adapter agree on its shape.
#[derive(Debug, Clone)]
pub struct CheckpointInput<'a> {
    pub task: &'a Task,
    pub checkpoint: &'a Checkpoint,
}
