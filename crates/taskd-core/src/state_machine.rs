//! Task State Machine: the lifecycle of one task.
//!
//! These are pure transition functions over `&mut Task`: given the
//! current task and an already-computed result (from the agent driver,
//! from an admission decision made by the usage tracker/scheduler), they
//! mutate the task and return the event(s) a caller must publish. No I/O
//! happens here — running the agent driver, writing the checkpoint to
//! the store, and publishing the event onto the bus are the daemon
//! crate's job (`taskd-daemon::stage_runner` / `orchestrator`).
//!
//! Session-limit/usage-limit signals are a first-class `StageOutcome`
//! variant rather than an exception thrown and matched on by string.

use chrono::{DateTime, Utc};

use crate::error::TaskdError;
use crate::events::DomainEvent;
use crate::types::{Checkpoint, PauseReason, Task, TaskStatus, TaskUsage};

/// Result of running a task's current stage through the agent driver.
/// Produced by `taskd-daemon::stage_runner`, consumed by `advance_stage`.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Ok(TaskUsage),
    Retryable(String),
    SessionLimit(String),
    UsageLimit(String),
    Fatal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Continue,
    Summarize,
    Checkpoint,
    Handoff,
}

/// Recommend an action for the current conversation based on context
/// window utilization. Thresholds: 0.60 / 0.80 / 0.95.
pub fn session_limit_check(tokens: u64, context_window: u64) -> SessionAction {
    if context_window == 0 {
        return SessionAction::Handoff;
    }
    let utilization = tokens as f64 / context_window as f64;
    if utilization >= 0.95 {
        SessionAction::Handoff
    } else if utilization >= 0.80 {
        SessionAction::Checkpoint
    } else if utilization >= 0.60 {
        SessionAction::Summarize
    } else {
        SessionAction::Continue
    }
}

#[derive(Debug, Clone)]
pub enum AdvanceResult {
    /// Stage advanced, or the whole task completed if this was the last stage.
    Advanced(DomainEvent),
    /// Same stage will be retried; caller should re-run it.
    Retrying,
    Paused(DomainEvent),
    Failed(DomainEvent),
}

#[derive(Debug, Clone)]
pub enum ResumeResult {
    Resumed(DomainEvent),
    Failed(DomainEvent),
    /// Not paused, or a concurrent resume already won the per-task mutex.
    NoOp,
}

/// Requires `status ∈ {queued, paused}`. Caller must have already
/// confirmed admission is allowed (usage tracker + scheduler checks live
/// outside this pure crate).
pub fn admit(task: &mut Task, now: DateTime<Utc>) -> Result<DomainEvent, TaskdError> {
    if !matches!(task.status, TaskStatus::Queued | TaskStatus::Paused) {
        return Err(TaskdError::InvalidTransition(format!(
            "cannot admit task in status {:?}",
            task.status
        )));
    }
    let first_stage = task
        .workflow
        .first()
        .cloned()
        .ok_or_else(|| TaskdError::InvalidTransition("workflow has no stages".into()))?;
    task.status = TaskStatus::Running;
    task.current_stage = Some(first_stage.clone());
    task.pause_reason = None;
    task.updated_at = now;
    Ok(DomainEvent::TaskStarted {
        task_id: task.id.clone(),
        stage: first_stage,
    })
}

/// Apply the result of running the current stage. Requires `running`.
pub fn advance_stage(task: &mut Task, outcome: StageOutcome, now: DateTime<Utc>) -> AdvanceResult {
    if task.status != TaskStatus::Running {
        return AdvanceResult::Failed(DomainEvent::TaskFailed {
            task_id: task.id.clone(),
            error: "advance_stage called on a non-running task".into(),
            failure_reason: "invalid_transition".into(),
            stage: task.current_stage.clone(),
        });
    }
    task.updated_at = now;

    match outcome {
        StageOutcome::Ok(usage) => {
            task.usage.add(&usage);
            task.retry_count = 0;
            let from = task.current_stage.clone();
            let current_index = task.current_stage_index().unwrap_or(0);
            let next_index = current_index + 1;
            if next_index >= task.workflow.len() {
                task.status = TaskStatus::Completed;
                task.current_stage = None;
                AdvanceResult::Advanced(DomainEvent::TaskCompleted { task_id: task.id.clone() })
            } else {
                let next_stage = task.workflow[next_index].clone();
                task.current_stage = Some(next_stage.clone());
                AdvanceResult::Advanced(DomainEvent::TaskStageChanged {
                    task_id: task.id.clone(),
                    from,
                    to: next_stage,
                })
            }
        }
        StageOutcome::SessionLimit(reason) => {
            let event = pause_unchecked(task, PauseReason::SessionLimit, now);
            let _ = reason;
            AdvanceResult::Paused(event)
        }
        StageOutcome::UsageLimit(reason) => {
            let event = pause_unchecked(task, PauseReason::UsageLimit, now);
            let _ = reason;
            AdvanceResult::Paused(event)
        }
        StageOutcome::Retryable(err) => {
            task.retry_count += 1;
            if task.retry_count < task.max_retries {
                AdvanceResult::Retrying
            } else {
                task.status = TaskStatus::Failed;
                task.failure_reason = Some("retry_exhausted".into());
                AdvanceResult::Failed(DomainEvent::TaskFailed {
                    task_id: task.id.clone(),
                    error: err,
                    failure_reason: "retry_exhausted".into(),
                    stage: task.current_stage.clone(),
                })
            }
        }
        StageOutcome::Fatal(err) => {
            task.status = TaskStatus::Failed;
            task.failure_reason = Some("stage_fatal".into());
            AdvanceResult::Failed(DomainEvent::TaskFailed {
                task_id: task.id.clone(),
                error: err,
                failure_reason: "stage_fatal".into(),
                stage: task.current_stage.clone(),
            })
        }
    }
}

/// Requires `running`. Snapshots happen at the call site: the caller
/// writes a checkpoint before invoking this, since every operation
/// performs a checkpoint before emitting its event. This function only
/// performs the status transition and event.
pub fn pause(task: &mut Task, reason: PauseReason, now: DateTime<Utc>) -> Result<DomainEvent, TaskdError> {
    if task.status != TaskStatus::Running {
        return Err(TaskdError::InvalidTransition(format!(
            "cannot pause task in status {:?}",
            task.status
        )));
    }
    Ok(pause_unchecked(task, reason, now))
}

fn pause_unchecked(task: &mut Task, reason: PauseReason, now: DateTime<Utc>) -> DomainEvent {
    task.status = TaskStatus::Paused;
    task.pause_reason = Some(reason);
    task.paused_at = Some(now);
    task.updated_at = now;
    DomainEvent::TaskPaused {
        task_id: task.id.clone(),
        reason,
        at: now,
    }
}

/// Requires `status = paused`. Atomically increments `resume_attempts`;
/// crossing `max_resume_attempts` transitions to `failed`. Calling
/// `resume` on a non-paused task is a no-op — callers serialize
/// concurrent calls on the same task with a per-task mutex; this
/// function assumes that serialization has already happened, so within
/// a single call there is no race to resolve.
pub fn resume(task: &mut Task, now: DateTime<Utc>, checkpoint: Option<&Checkpoint>) -> ResumeResult {
    if task.status != TaskStatus::Paused {
        return ResumeResult::NoOp;
    }
    task.resume_attempts += 1;
    task.updated_at = now;

    if task.resume_attempts > task.max_resume_attempts {
        task.status = TaskStatus::Failed;
        task.failure_reason = Some("resume_exhausted".into());
        return ResumeResult::Failed(DomainEvent::TaskFailed {
            task_id: task.id.clone(),
            error: format!(
                "resume attempts {} exceeded max {}",
                task.resume_attempts, task.max_resume_attempts
            ),
            failure_reason: "resume_exhausted".into(),
            stage: task.current_stage.clone(),
        });
    }

    task.status = TaskStatus::Running;
    task.pause_reason = None;
    let summary = generate_context_summary(task, checkpoint, &[]);
    ResumeResult::Resumed(DomainEvent::TaskSessionResumed {
        task_id: task.id.clone(),
        context_summary: summary,
        resume_attempts: task.resume_attempts,
    })
}

const CONTEXT_SUMMARY_MAX_BYTES: usize = 2048;

/// Resume context-summary generation:
/// 1. explicit checkpoint summary if present,
/// 2. else a bounded concatenation of the last N conversation turns,
/// 3. else a generic fallback. Never panics — any generation failure
/// (e.g. malformed turn data) falls back silently, since resume must
/// never be blocked by summary generation.
pub fn generate_context_summary(
    task: &Task,
    checkpoint: Option<&Checkpoint>,
    recent_turns: &[(String, String)],
) -> String {
    if let Some(cp) = checkpoint {
        if let Some(summary) = cp.context_summary.as_ref().filter(|s| !s.is_empty()) {
            return summary.clone();
        }
    }

    if !recent_turns.is_empty() {
        let mut buf = String::new();
        for (role, text) in recent_turns.iter().rev() {
            let line = format!("[{role}] {text}\n");
            if buf.len() + line.len() > CONTEXT_SUMMARY_MAX_BYTES {
                break;
            }
            buf.insert_str(0, &line);
        }
        if !buf.is_empty() {
            return buf;
        }
    }

    let stage = task.current_stage.as_deref().unwrap_or("unknown");
    format!("Task was paused in stage {stage}; resuming from checkpoint.")
}

pub fn cancel(task: &mut Task, now: DateTime<Utc>) -> Result<(), TaskdError> {
    if task.status.is_terminal() {
        return Err(TaskdError::InvalidTransition(format!(
            "cannot cancel task already in terminal status {:?}",
            task.status
        )));
    }
    task.status = TaskStatus::Cancelled;
    task.updated_at = now;
    Ok(())
}

pub fn trash(task: &mut Task, now: DateTime<Utc>) -> Result<DomainEvent, TaskdError> {
    if !task.status.is_terminal() || task.status == TaskStatus::Trashed {
        return Err(TaskdError::InvalidTransition(format!(
            "cannot trash task in status {:?}",
            task.status
        )));
    }
    task.status = TaskStatus::Trashed;
    task.updated_at = now;
    Ok(DomainEvent::TaskTrashed { task_id: task.id.clone() })
}

pub fn restore(task: &mut Task, previous_status: TaskStatus, now: DateTime<Utc>) -> Result<DomainEvent, TaskdError> {
    if task.status != TaskStatus::Trashed {
        return Err(TaskdError::InvalidTransition("only a trashed task can be restored".into()));
    }
    task.status = previous_status;
    task.updated_at = now;
    Ok(DomainEvent::TaskRestored { task_id: task.id.clone() })
}

pub fn archive(task: &mut Task, now: DateTime<Utc>) -> Result<DomainEvent, TaskdError> {
    if task.status != TaskStatus::Completed {
        return Err(TaskdError::InvalidTransition("only a completed task can be archived".into()));
    }
    task.status = TaskStatus::Archived;
    task.updated_at = now;
    Ok(DomainEvent::TaskArchived { task_id: task.id.clone() })
}

pub fn unarchive(task: &mut Task, now: DateTime<Utc>) -> Result<DomainEvent, TaskdError> {
    if task.status != TaskStatus::Archived {
        return Err(TaskdError::InvalidTransition("only an archived task can be unarchived".into()));
    }
    task.status = TaskStatus::Completed;
    task.updated_at = now;
    Ok(DomainEvent::TaskUnarchived { task_id: task.id.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Priority, SubtaskStrategy, Workspace, WorkspaceStrategy};
    use chrono::TimeZone;

    fn make_task(workflow: Vec<&str>) -> Task {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        Task {
            id: "t1".into(),
            description: "test".into(),
            workflow: workflow.into_iter().map(String::from).collect(),
            autonomy: "full".into(),
            priority: Priority::Normal,
            project_path: "/tmp/proj".into(),
            status: TaskStatus::Queued,
            current_stage: None,
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
            estimated_cost: 0.0,
            estimated_tokens: 0,
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
        }
    }

    #[test]
    fn admit_sets_running_and_first_stage() {
        let mut t = make_task(vec!["plan", "implement"]);
        let now = Utc::now();
        let ev = admit(&mut t, now).unwrap();
        assert_eq!(t.status, TaskStatus::Running);
        assert_eq!(t.current_stage.as_deref(), Some("plan"));
        matches!(ev, DomainEvent::TaskStarted { .. });
    }

    #[test]
    fn admit_rejects_running_task() {
        let mut t = make_task(vec!["plan"]);
        t.status = TaskStatus::Running;
        assert!(admit(&mut t, Utc::now()).is_err());
    }

    #[test]
    fn advance_last_stage_completes_task() {
        let mut t = make_task(vec!["plan"]);
        admit(&mut t, Utc::now()).unwrap();
        let result = advance_stage(&mut t, StageOutcome::Ok(TaskUsage::default()), Utc::now());
        assert_eq!(t.status, TaskStatus::Completed);
        matches!(result, AdvanceResult::Advanced(DomainEvent::TaskCompleted { .. }));
    }

    #[test]
    fn advance_middle_stage_moves_forward() {
        let mut t = make_task(vec!["plan", "implement", "review"]);
        admit(&mut t, Utc::now()).unwrap();
        advance_stage(&mut t, StageOutcome::Ok(TaskUsage::default()), Utc::now());
        assert_eq!(t.current_stage.as_deref(), Some("implement"));
        assert_eq!(t.status, TaskStatus::Running);
    }

    #[test]
    fn retryable_error_retries_until_exhausted() {
        let mut t = make_task(vec!["plan"]);
        t.max_retries = 2;
        admit(&mut t, Utc::now()).unwrap();
        let r1 = advance_stage(&mut t, StageOutcome::Retryable("boom".into()), Utc::now());
        assert!(matches!(r1, AdvanceResult::Retrying));
        assert_eq!(t.status, TaskStatus::Running);
        let r2 = advance_stage(&mut t, StageOutcome::Retryable("boom".into()), Utc::now());
        assert!(matches!(r2, AdvanceResult::Failed(_)));
        assert_eq!(t.status, TaskStatus::Failed);
    }

    #[test]
    fn session_limit_outcome_pauses_resumably() {
        let mut t = make_task(vec!["plan"]);
        admit(&mut t, Utc::now()).unwrap();
        let r = advance_stage(&mut t, StageOutcome::SessionLimit("ctx full".into()), Utc::now());
        assert_eq!(t.status, TaskStatus::Paused);
        assert_eq!(t.pause_reason, Some(PauseReason::SessionLimit));
        assert!(matches!(r, AdvanceResult::Paused(_)));
    }

    #[test]
    fn fatal_error_fails_immediately_without_retry() {
        let mut t = make_task(vec!["plan"]);
        t.max_retries = 5;
        admit(&mut t, Utc::now()).unwrap();
        advance_stage(&mut t, StageOutcome::Fatal("programmer error".into()), Utc::now());
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.retry_count, 0);
    }

    // --- P1: bounded resume / scenario 3 (resume exhaustion) ---
    #[test]
    fn resume_exhaustion_after_max_attempts() {
        let mut t = make_task(vec!["plan"]);
        t.max_resume_attempts = 3;
        t.status = TaskStatus::Paused;
        t.pause_reason = Some(PauseReason::SessionLimit);

        for _ in 0..3 {
            let r = resume(&mut t, Utc::now(), None);
            assert!(matches!(r, ResumeResult::Resumed(_)));
            t.status = TaskStatus::Paused; // simulate hitting session limit again
        }
        let r4 = resume(&mut t, Utc::now(), None);
        assert!(matches!(r4, ResumeResult::Failed(_)));
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.resume_attempts, 4);
        assert_eq!(t.failure_reason.as_deref(), Some("resume_exhausted"));
    }

    // --- P7: resume on a non-paused task is a no-op ---
    #[test]
    fn resume_on_running_task_is_noop() {
        let mut t = make_task(vec!["plan"]);
        admit(&mut t, Utc::now()).unwrap();
        let before = t.resume_attempts;
        let r = resume(&mut t, Utc::now(), None);
        assert!(matches!(r, ResumeResult::NoOp));
        assert_eq!(t.resume_attempts, before);
    }

    #[test]
    fn context_summary_prefers_checkpoint_summary() {
        let t = make_task(vec!["plan"]);
        let cp = Checkpoint {
            task_id: "t1".into(),
            checkpoint_id: "c1".into(),
            stage: "plan".into(),
            stage_index: 0,
            conversation_state: serde_json::json!({}),
            metadata: serde_json::json!({}),
            context_summary: Some("explicit summary".into()),
            created_at: Utc::now(),
        };
        let s = generate_context_summary(&t, Some(&cp), &[("user".into(), "hi".into())]);
        assert_eq!(s, "explicit summary");
    }

    #[test]
    fn context_summary_falls_back_to_recent_turns() {
        let mut t = make_task(vec!["plan"]);
        t.current_stage = Some("plan".into());
        let turns = vec![
            ("user".to_string(), "do the thing".to_string()),
            ("assistant".to_string(), "working on it".to_string()),
        ];
        let s = generate_context_summary(&t, None, &turns);
        assert!(s.contains("do the thing"));
        assert!(s.contains("working on it"));
        assert!(s.len() <= CONTEXT_SUMMARY_MAX_BYTES + 256);
    }

    #[test]
    fn context_summary_generic_fallback_when_nothing_available() {
        let mut t = make_task(vec!["plan"]);
        t.current_stage = Some("plan".into());
        let s = generate_context_summary(&t, None, &[]);
        assert!(s.contains("paused in stage plan"));
    }

    #[test]
    fn session_limit_thresholds() {
        assert_eq!(session_limit_check(50, 1000), SessionAction::Continue);
        assert_eq!(session_limit_check(650, 1000), SessionAction::Summarize);
        assert_eq!(session_limit_check(850, 1000), SessionAction::Checkpoint);
        assert_eq!(session_limit_check(960, 1000), SessionAction::Handoff);
    }

    #[test]
    fn trash_and_restore_roundtrip() {
        let mut t = make_task(vec!["plan"]);
        t.status = TaskStatus::Completed;
        trash(&mut t, Utc::now()).unwrap();
        assert_eq!(t.status, TaskStatus::Trashed);
        restore(&mut t, TaskStatus::Completed, Utc::now()).unwrap();
        assert_eq!(t.status, TaskStatus::Completed);
    }

    #[test]
    fn archive_requires_completed() {
        let mut t = make_task(vec!["plan"]);
        assert!(archive(&mut t, Utc::now()).is_err());
        t.status = TaskStatus::Completed;
        archive(&mut t, Utc::now()).unwrap();
        assert_eq!(t.status, TaskStatus::Archived);
        unarchive(&mut t, Utc::now()).unwrap();
        assert_eq!(t.status, TaskStatus::Completed);
    }
}
