use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A durable snapshot sufficient to resume a task's current stage.
///
/// `(task_id, checkpoint_id)` is unique; resume always reads the latest
/// checkpoint for a task (highest `created_at`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub task_id: String,
    pub checkpoint_id: String,
    pub stage: String,
    pub stage_index: usize,
    pub conversation_state: serde_json::Value,
    pub metadata: serde_json::Value,
    /// Pre-generated summary to use on resume, if the pause path produced
    /// one. Absent when the caller should fall back to the bounded
    /// last-N-turns summary or the generic placeholder.
    #[serde(default)]
    pub context_summary: Option<String>,
    pub created_at: DateTime<Utc>,
}
