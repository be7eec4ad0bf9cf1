//! SQLite-backed persistence for tasks, checkpoints, and task logs.
//!
//! The contract (`getTask`, `updateTask`, `createTask`,
//! `getNextQueuedTask`, `getPausedTasksForResume`,
//! `findHighestPriorityParentTask`, `createCheckpoint`,
//! `getLatestCheckpoint`, `addLog`) is expressed here as the `Store`
//! trait so the daemon crate depends on a contract, not a concrete
//! engine. This store survives restarts as the *only* record of task
//! lifecycle, so it also owns checkpoints, logs, and cycle rejection for
//! parent/subtask links.

mod error;
pub mod serde_helpers;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteStore;

use taskd_core::types::{Checkpoint, DailyUsageStats, Task};

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Store contract. `updateTask`'s "atomic merge" is implemented as
/// a full-row upsert of the in-memory `Task` the caller already mutated
/// via `taskd_core::state_machine` — the merge is atomic in the sense
/// that a single `INSERT OR REPLACE` either fully applies or not at all,
/// not in the sense of a field-level partial patch. `timestamps
/// auto-updated` is honored by the state machine setting `updated_at`
/// on every mutation before the row is saved.
pub trait Store: Send + Sync {
    fn get_task(&self, id: &str) -> StoreResult<Option<Task>>;
    fn list_tasks(&self) -> StoreResult<Vec<Task>>;
    fn create_task(&self, task: &Task) -> StoreResult<String>;
    fn update_task(&self, task: &Task) -> StoreResult<()>;
    fn get_next_queued_task(&self) -> StoreResult<Option<Task>>;
    fn get_paused_tasks_for_resume(&self) -> StoreResult<Vec<Task>>;
    fn find_highest_priority_parent_task(&self) -> StoreResult<Vec<Task>>;
    fn link_subtask(&self, parent_id: &str, child_id: &str) -> StoreResult<()>;
    fn create_checkpoint(&self, checkpoint: &Checkpoint) -> StoreResult<()>;
    fn get_latest_checkpoint(&self, task_id: &str) -> StoreResult<Option<Checkpoint>>;
    fn add_log(&self, task_id: &str, entry: &LogEntry) -> StoreResult<()>;
    fn save_daily_stats(&self, stats: &DailyUsageStats) -> StoreResult<()>;
    fn load_daily_stats(&self, date: &str) -> StoreResult<Option<DailyUsageStats>>;
}
