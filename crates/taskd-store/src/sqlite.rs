use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use taskd_core::types::{
    Checkpoint, DailyUsageStats, ModeUsage, PauseReason, Priority, SubtaskStrategy, Task, TaskStatus,
    TaskUsage, Workspace,
};

use crate::error::{StoreError, StoreResult};
use crate::serde_helpers::{from_json, parse_enum, serde_variant_name, to_json};
use crate::{LogEntry, Store};

pub struct SqliteStore {
    conn: std::sync::Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: std::sync::Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: std::sync::Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id                  TEXT PRIMARY KEY,
                description         TEXT NOT NULL,
                workflow            TEXT NOT NULL,
                autonomy            TEXT NOT NULL,
                priority            TEXT NOT NULL,
                priority_rank       INTEGER NOT NULL,
                project_path        TEXT NOT NULL,
                status              TEXT NOT NULL,
                current_stage       TEXT,
                pause_reason        TEXT,
                resume_attempts     INTEGER NOT NULL DEFAULT 0,
                max_resume_attempts INTEGER NOT NULL DEFAULT 3,
                retry_count         INTEGER NOT NULL DEFAULT 0,
                max_retries         INTEGER NOT NULL DEFAULT 3,
                parent_task_id      TEXT,
                subtask_ids         TEXT NOT NULL DEFAULT '[]',
                subtask_strategy    TEXT NOT NULL DEFAULT 'parallel',
                depends_on          TEXT NOT NULL DEFAULT '[]',
                blocked_by          TEXT NOT NULL DEFAULT '[]',
                estimated_cost      REAL NOT NULL DEFAULT 0.0,
                estimated_tokens    INTEGER NOT NULL DEFAULT 0,
                input_tokens        INTEGER NOT NULL DEFAULT 0,
                output_tokens       INTEGER NOT NULL DEFAULT 0,
                total_tokens        INTEGER NOT NULL DEFAULT 0,
                usage_cost          REAL NOT NULL DEFAULT 0.0,
                workspace           TEXT NOT NULL,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL,
                paused_at           TEXT,
                failure_reason      TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            CREATE INDEX IF NOT EXISTS idx_tasks_status_priority_paused
                ON tasks(status, priority_rank, paused_at);
            CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_task_id);

            CREATE TABLE IF NOT EXISTS checkpoints (
                task_id             TEXT NOT NULL,
                checkpoint_id       TEXT NOT NULL,
                stage               TEXT NOT NULL,
                stage_index         INTEGER NOT NULL,
                conversation_state  TEXT NOT NULL,
                metadata            TEXT NOT NULL,
                context_summary     TEXT,
                created_at          TEXT NOT NULL,
                PRIMARY KEY (task_id, checkpoint_id)
            );
            CREATE INDEX IF NOT EXISTS idx_checkpoints_task_created
                ON checkpoints(task_id, created_at);

            CREATE TABLE IF NOT EXISTS task_logs (
                task_id             TEXT NOT NULL,
                level               TEXT NOT NULL,
                message             TEXT NOT NULL,
                created_at          TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_task_logs_task ON task_logs(task_id);

            CREATE TABLE IF NOT EXISTS daily_usage_stats (
                date                TEXT PRIMARY KEY,
                total_tokens        INTEGER NOT NULL,
                total_cost          REAL NOT NULL,
                tasks_completed     INTEGER NOT NULL,
                tasks_failed        INTEGER NOT NULL,
                peak_concurrent_tasks INTEGER NOT NULL,
                day_mode            TEXT NOT NULL,
                night_mode          TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn ancestors_of(&self, conn: &Connection, task_id: &str) -> StoreResult<Vec<String>> {
        let mut ancestors = Vec::new();
        let mut current = task_id.to_string();
        // A bounded walk: the forest cannot be deeper than the number of
        // rows, so this always terminates even if a cycle somehow exists.
        let mut guard = conn.query_row("SELECT COUNT(*) FROM tasks", [], |r| r.get::<_, i64>(0))? + 1;
        loop {
            if guard <= 0 {
                break;
            }
            guard -= 1;
            let parent: Option<String> = conn
                .query_row(
                    "SELECT parent_task_id FROM tasks WHERE id = ?1",
                    params![current],
                    |r| r.get(0),
                )
                .ok()
                .flatten();
            match parent {
                Some(p) => {
                    ancestors.push(p.clone());
                    current = p;
                }
                None => break,
            }
        }
        Ok(ancestors)
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        let priority_str: String = row.get("priority")?;
        let status_str: String = row.get("status")?;
        let pause_reason_str: Option<String> = row.get("pause_reason")?;
        let subtask_strategy_str: String = row.get("subtask_strategy")?;
        let workflow_str: String = row.get("workflow")?;
        let subtask_ids_str: String = row.get("subtask_ids")?;
        let depends_on_str: String = row.get("depends_on")?;
        let blocked_by_str: String = row.get("blocked_by")?;
        let workspace_str: String = row.get("workspace")?;
        let created_at_str: String = row.get("created_at")?;
        let updated_at_str: String = row.get("updated_at")?;
        let paused_at_str: Option<String> = row.get("paused_at")?;

        Ok(Task {
            id: row.get("id")?,
            description: row.get("description")?,
            workflow: from_json(&workflow_str),
            autonomy: row.get("autonomy")?,
            priority: parse_enum(&priority_str).unwrap_or(Priority::Normal),
            project_path: row.get("project_path")?,
            status: parse_enum(&status_str).unwrap_or(TaskStatus::Queued),
            current_stage: row.get("current_stage")?,
            pause_reason: pause_reason_str.as_deref().and_then(parse_enum),
            resume_attempts: row.get::<_, i64>("resume_attempts")? as u32,
            max_resume_attempts: row.get::<_, i64>("max_resume_attempts")? as u32,
            retry_count: row.get::<_, i64>("retry_count")? as u32,
            max_retries: row.get::<_, i64>("max_retries")? as u32,
            parent_task_id: row.get("parent_task_id")?,
            subtask_ids: from_json(&subtask_ids_str),
            subtask_strategy: parse_enum(&subtask_strategy_str).unwrap_or(SubtaskStrategy::Parallel),
            depends_on: from_json(&depends_on_str),
            blocked_by: from_json(&blocked_by_str),
            estimated_cost: row.get("estimated_cost")?,
            estimated_tokens: row.get::<_, i64>("estimated_tokens")? as u64,
            usage: TaskUsage {
                input_tokens: row.get::<_, i64>("input_tokens")? as u64,
                output_tokens: row.get::<_, i64>("output_tokens")? as u64,
                total_tokens: row.get::<_, i64>("total_tokens")? as u64,
                estimated_cost: row.get("usage_cost")?,
            },
            workspace: serde_json::from_str(&workspace_str).unwrap_or(Workspace {
                strategy: taskd_core::types::WorkspaceStrategy::Directory,
                path: String::new(),
                preserve_on_failure: None,
            }),
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
            paused_at: paused_at_str.as_deref().map(parse_timestamp),
            failure_reason: row.get("failure_reason")?,
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn priority_rank(p: Priority) -> i64 {
    match p {
        Priority::Urgent => 3,
        Priority::High => 2,
        Priority::Normal => 1,
        Priority::Low => 0,
    }
}

impl Store for SqliteStore {
    fn get_task(&self, id: &str) -> StoreResult<Option<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM tasks WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_task(row)?))
        } else {
            Ok(None)
        }
    }

    fn create_task(&self, task: &Task) -> StoreResult<String> {
        self.update_task(task)?;
        Ok(task.id.clone())
    }

    fn update_task(&self, task: &Task) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO tasks (
                id, description, workflow, autonomy, priority, priority_rank, project_path,
                status, current_stage, pause_reason, resume_attempts, max_resume_attempts,
                retry_count, max_retries, parent_task_id, subtask_ids, subtask_strategy,
                depends_on, blocked_by, estimated_cost, estimated_tokens,
                input_tokens, output_tokens, total_tokens,
                usage_cost, workspace, created_at, updated_at, paused_at, failure_reason
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30
            )",
            params![
                task.id,
                task.description,
                to_json(&task.workflow),
                task.autonomy,
                serde_variant_name(&task.priority),
                priority_rank(task.priority),
                task.project_path,
                serde_variant_name(&task.status),
                task.current_stage,
                task.pause_reason.map(|r| serde_variant_name(&r)),
                task.resume_attempts,
                task.max_resume_attempts,
                task.retry_count,
                task.max_retries,
                task.parent_task_id,
                to_json(&task.subtask_ids),
                serde_variant_name(&task.subtask_strategy),
                to_json(&task.depends_on),
                to_json(&task.blocked_by),
                task.estimated_cost,
                task.estimated_tokens,
                task.usage.input_tokens,
                task.usage.output_tokens,
                task.usage.total_tokens,
                task.usage.estimated_cost,
                serde_json::to_string(&task.workspace).unwrap_or_default(),
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
                task.paused_at.map(|t| t.to_rfc3339()),
                task.failure_reason,
            ],
        )?;
        Ok(())
    }

    fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM tasks ORDER BY created_at ASC")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(Self::row_to_task(row)?);
        }
        Ok(out)
    }

    fn get_next_queued_task(&self) -> StoreResult<Option<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks WHERE status = 'queued'
             ORDER BY priority_rank DESC, created_at ASC LIMIT 1",
        )?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_task(row)?))
        } else {
            Ok(None)
        }
    }

    fn get_paused_tasks_for_resume(&self) -> StoreResult<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks WHERE status = 'paused' AND pause_reason != ?1
             ORDER BY priority_rank DESC, paused_at ASC",
        )?;
        let user_request = serde_variant_name(&PauseReason::UserRequest);
        let mut rows = stmt.query(params![user_request])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(Self::row_to_task(row)?);
        }
        Ok(out)
    }

    fn find_highest_priority_parent_task(&self) -> StoreResult<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks WHERE status = 'paused' AND subtask_ids != '[]'
             ORDER BY priority_rank DESC, paused_at ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut candidates = Vec::new();
        while let Some(row) = rows.next()? {
            candidates.push(Self::row_to_task(row)?);
        }

        let mut parents = Vec::new();
        for parent in candidates {
            let mut has_non_terminal_subtask = false;
            for sid in &parent.subtask_ids {
                let status: Option<String> = conn
                    .query_row("SELECT status FROM tasks WHERE id = ?1", params![sid], |r| r.get(0))
                    .ok();
                if let Some(s) = status {
                    let status: TaskStatus = parse_enum(&s).unwrap_or(TaskStatus::Queued);
                    if !status.is_terminal() {
                        has_non_terminal_subtask = true;
                        break;
                    }
                }
            }
            if has_non_terminal_subtask {
                parents.push(parent);
            }
        }
        Ok(parents)
    }

    fn link_subtask(&self, parent_id: &str, child_id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let ancestors = self.ancestors_of(&conn, parent_id)?;
        if parent_id == child_id || ancestors.iter().any(|a| a == child_id) {
            return Err(StoreError::CycleDetected {
                parent: parent_id.to_string(),
                child: child_id.to_string(),
            });
        }
        conn.execute(
            "UPDATE tasks SET parent_task_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![parent_id, Utc::now().to_rfc3339(), child_id],
        )?;
        let subtask_ids_str: String = conn.query_row(
            "SELECT subtask_ids FROM tasks WHERE id = ?1",
            params![parent_id],
            |r| r.get(0),
        )?;
        let mut subtask_ids: Vec<String> = from_json(&subtask_ids_str);
        if !subtask_ids.iter().any(|s| s == child_id) {
            subtask_ids.push(child_id.to_string());
        }
        conn.execute(
            "UPDATE tasks SET subtask_ids = ?1, updated_at = ?2 WHERE id = ?3",
            params![to_json(&subtask_ids), Utc::now().to_rfc3339(), parent_id],
        )?;
        Ok(())
    }

    fn create_checkpoint(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO checkpoints (
                task_id, checkpoint_id, stage, stage_index, conversation_state, metadata,
                context_summary, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                checkpoint.task_id,
                checkpoint.checkpoint_id,
                checkpoint.stage,
                checkpoint.stage_index as i64,
                serde_json::to_string(&checkpoint.conversation_state).unwrap_or_default(),
                serde_json::to_string(&checkpoint.metadata).unwrap_or_default(),
                checkpoint.context_summary,
                checkpoint.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_latest_checkpoint(&self, task_id: &str) -> StoreResult<Option<Checkpoint>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT task_id, checkpoint_id, stage, stage_index, conversation_state, metadata,
                    context_summary, created_at
             FROM checkpoints WHERE task_id = ?1 ORDER BY created_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![task_id])?;
        if let Some(row) = rows.next()? {
            let conversation_state_str: String = row.get(4)?;
            let metadata_str: String = row.get(5)?;
            let created_at_str: String = row.get(7)?;
            Ok(Some(Checkpoint {
                task_id: row.get(0)?,
                checkpoint_id: row.get(1)?,
                stage: row.get(2)?,
                stage_index: row.get::<_, i64>(3)? as usize,
                conversation_state: serde_json::from_str(&conversation_state_str)
                    .unwrap_or(serde_json::Value::Null),
                metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::Value::Null),
                context_summary: row.get(6)?,
                created_at: parse_timestamp(&created_at_str),
            }))
        } else {
            Ok(None)
        }
    }

    fn add_log(&self, task_id: &str, entry: &LogEntry) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO task_logs (task_id, level, message, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![task_id, entry.level, entry.message, entry.timestamp.to_rfc3339()],
        )?;
        Ok(())
    }

    fn save_daily_stats(&self, stats: &DailyUsageStats) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO daily_usage_stats (
                date, total_tokens, total_cost, tasks_completed, tasks_failed,
                peak_concurrent_tasks, day_mode, night_mode
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                stats.date,
                stats.total_tokens,
                stats.total_cost,
                stats.tasks_completed,
                stats.tasks_failed,
                stats.peak_concurrent_tasks,
                to_json(&stats.day_mode),
                to_json(&stats.night_mode),
            ],
        )?;
        Ok(())
    }

    fn load_daily_stats(&self, date: &str) -> StoreResult<Option<DailyUsageStats>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM daily_usage_stats WHERE date = ?1")?;
        let mut rows = stmt.query(params![date])?;
        if let Some(row) = rows.next()? {
            let day_mode_str: String = row.get("day_mode")?;
            let night_mode_str: String = row.get("night_mode")?;
            Ok(Some(DailyUsageStats {
                date: row.get("date")?,
                total_tokens: row.get::<_, i64>("total_tokens")? as u64,
                total_cost: row.get("total_cost")?,
                tasks_completed: row.get::<_, i64>("tasks_completed")? as u64,
                tasks_failed: row.get::<_, i64>("tasks_failed")? as u64,
                peak_concurrent_tasks: row.get::<_, i64>("peak_concurrent_tasks")? as u32,
                day_mode: serde_json::from_str::<ModeUsage>(&day_mode_str).unwrap_or_default(),
                night_mode: serde_json::from_str::<ModeUsage>(&night_mode_str).unwrap_or_default(),
            }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskd_core::types::{SubtaskStrategy, WorkspaceStrategy};
    use chrono::TimeZone;

    fn make_task(id: &str, status: TaskStatus, priority: Priority) -> Task {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        Task {
            id: id.into(),
            description: "desc".into(),
            workflow: vec!["plan".into(), "implement".into()],
            autonomy: "full".into(),
            priority,
            project_path: "/tmp/proj".into(),
            status,
            current_stage: Some("plan".into()),
            pause_reason: None,
            resume_attempts: 0,
            max_resume_attempts: 3,
            retry_count: 0,
            max_retries: 3,
            parent_task_id: None,
            subtask_ids: vec![],
            subtask_strategy: SubtaskStrategy::Parallel,
            depends_on: vec![],
            blocked_by: vec![],
            usage: TaskUsage::default(),
            workspace: Workspace {
                strategy: WorkspaceStrategy::Directory,
                path: "/tmp/proj".into(),
                preserve_on_failure: None,
            },
            created_at: now,
            updated_at: now,
            paused_at: None,
            failure_reason: None,
            estimated_cost: 0.0,
            estimated_tokens: 0,
        }
    }

    #[test]
    fn create_and_get_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let t = make_task("t1", TaskStatus::Queued, Priority::Normal);
        store.create_task(&t).unwrap();
        let loaded = store.get_task("t1").unwrap().unwrap();
        assert_eq!(loaded.id, "t1");
        assert_eq!(loaded.workflow, vec!["plan", "implement"]);
    }

    #[test]
    fn get_next_queued_task_orders_by_priority_then_age() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut low = make_task("low", TaskStatus::Queued, Priority::Low);
        low.created_at = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let mut urgent = make_task("urgent", TaskStatus::Queued, Priority::Urgent);
        urgent.created_at = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        store.create_task(&low).unwrap();
        store.create_task(&urgent).unwrap();

        let next = store.get_next_queued_task().unwrap().unwrap();
        assert_eq!(next.id, "urgent");
    }

    #[test]
    fn paused_tasks_for_resume_excludes_user_request() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut resumable = make_task("a", TaskStatus::Paused, Priority::Normal);
        resumable.pause_reason = Some(PauseReason::UsageLimit);
        let mut not_resumable = make_task("b", TaskStatus::Paused, Priority::Urgent);
        not_resumable.pause_reason = Some(PauseReason::UserRequest);
        store.create_task(&resumable).unwrap();
        store.create_task(&not_resumable).unwrap();

        let resumable_tasks = store.get_paused_tasks_for_resume().unwrap();
        assert_eq!(resumable_tasks.len(), 1);
        assert_eq!(resumable_tasks[0].id, "a");
    }

    #[test]
    fn paused_tasks_for_resume_priority_ordered() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (id, p) in [("low", Priority::Low), ("urgent", Priority::Urgent), ("normal", Priority::Normal)] {
            let mut t = make_task(id, TaskStatus::Paused, p);
            t.pause_reason = Some(PauseReason::Capacity);
            store.create_task(&t).unwrap();
        }
        let tasks = store.get_paused_tasks_for_resume().unwrap();
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["urgent", "normal", "low"]);
    }

    #[test]
    fn link_subtask_rejects_cycle() {
        let store = SqliteStore::open_in_memory().unwrap();
        let parent = make_task("p", TaskStatus::Paused, Priority::Normal);
        let child = make_task("c", TaskStatus::Queued, Priority::Normal);
        store.create_task(&parent).unwrap();
        store.create_task(&child).unwrap();

        store.link_subtask("p", "c").unwrap();
        // c is now a child of p; linking p under c would create a cycle.
        let result = store.link_subtask("c", "p");
        assert!(matches!(result, Err(StoreError::CycleDetected { .. })));
    }

    #[test]
    fn link_subtask_updates_parent_and_child() {
        let store = SqliteStore::open_in_memory().unwrap();
        let parent = make_task("p", TaskStatus::Paused, Priority::Normal);
        let child = make_task("c", TaskStatus::Queued, Priority::Normal);
        store.create_task(&parent).unwrap();
        store.create_task(&child).unwrap();

        store.link_subtask("p", "c").unwrap();
        let parent = store.get_task("p").unwrap().unwrap();
        let child = store.get_task("c").unwrap().unwrap();
        assert_eq!(parent.subtask_ids, vec!["c"]);
        assert_eq!(child.parent_task_id.as_deref(), Some("p"));
    }

    #[test]
    fn find_highest_priority_parent_task_requires_non_terminal_subtask() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut parent = make_task("p", TaskStatus::Paused, Priority::High);
        parent.subtask_ids = vec!["c".into()];
        store.create_task(&parent).unwrap();
        let child = make_task("c", TaskStatus::Completed, Priority::Normal);
        store.create_task(&child).unwrap();

        assert!(store.find_highest_priority_parent_task().unwrap().is_empty());

        let mut child2 = store.get_task("c").unwrap().unwrap();
        child2.status = TaskStatus::Running;
        store.update_task(&child2).unwrap();
        let parents = store.find_highest_priority_parent_task().unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].id, "p");
    }

    #[test]
    fn checkpoint_roundtrip_and_latest_wins() {
        let store = SqliteStore::open_in_memory().unwrap();
        let t = make_task("t1", TaskStatus::Running, Priority::Normal);
        store.create_task(&t).unwrap();

        let cp1 = Checkpoint {
            task_id: "t1".into(),
            checkpoint_id: "cp1".into(),
            stage: "plan".into(),
            stage_index: 0,
            conversation_state: serde_json::json!({"n": 1}),
            metadata: serde_json::json!({}),
            context_summary: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap(),
        };
        let cp2 = Checkpoint {
            checkpoint_id: "cp2".into(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap(),
            ..cp1.clone()
        };
        store.create_checkpoint(&cp1).unwrap();
        store.create_checkpoint(&cp2).unwrap();

        let latest = store.get_latest_checkpoint("t1").unwrap().unwrap();
        assert_eq!(latest.checkpoint_id, "cp2");
    }

    #[test]
    fn add_log_does_not_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let t = make_task("t1", TaskStatus::Running, Priority::Normal);
        store.create_task(&t).unwrap();
        store
            .add_log(
                "t1",
                &LogEntry {
                    level: "info".into(),
                    message: "stage started".into(),
                    timestamp: Utc::now(),
                },
            )
            .unwrap();
    }

    #[test]
    fn daily_stats_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let stats = DailyUsageStats::new_for_date("2026-01-01");
        store.save_daily_stats(&stats).unwrap();
        let loaded = store.load_daily_stats("2026-01-01").unwrap().unwrap();
        assert_eq!(loaded.date, "2026-01-01");
        assert!(store.load_daily_stats("2026-01-02").unwrap().is_none());
    }
}
