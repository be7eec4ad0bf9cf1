//! Orchestrator: accepts external commands, coordinates
//! Clock/Store/Usage/Scheduler, drives tasks through the state machine
//! via the stage runner, and owns the event bus. A struct owning the
//! mutable domain state and publishing to a `broadcast` channel, with
//! mutation funneled through a single `tokio::sync::Mutex` since
//! JSON-RPC requests and the auto-resume driver both call in
//! concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use taskd_core::clock::Clock;
use taskd_core::error::TaskdError;
use taskd_core::events::{AutoResumeError, DomainEvent};
use taskd_core::scheduler::TimeWindowScheduler;
use taskd_core::state_machine::{self, AdvanceResult, ResumeResult, StageOutcome};
use taskd_core::types::{CapacityRestoredEvent, Checkpoint, PauseReason, Task, TaskStatus, TaskUsage};
use taskd_core::usage::{TaskEstimate, UsageTracker};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::capacity_monitor::CapacityMonitor;
use crate::driver::AgentDriver;
use crate::stage_runner;
use taskd_store::{LogEntry, Store};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("store error: {0}")]
    Store(#[from] taskd_store::StoreError),
    #[error("task error: {0}")]
    Task(#[from] TaskdError),
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("task {0} is terminal and cannot accept this operation")]
    Terminal(String),
}

struct SchedulerState {
    scheduler: TimeWindowScheduler,
    usage: UsageTracker,
    capacity_monitor: CapacityMonitor,
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    driver: Arc<dyn AgentDriver>,
    clock: Arc<dyn Clock>,
    state: Mutex<SchedulerState>,
    event_tx: broadcast::Sender<DomainEvent>,
    resume_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    cancel_tokens: Mutex<HashMap<String, CancellationToken>>,
    stage_timeout: Duration,
    daily_budget: f64,
    default_max_resume_attempts: u32,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        driver: Arc<dyn AgentDriver>,
        clock: Arc<dyn Clock>,
        scheduler: TimeWindowScheduler,
        daily_budget: f64,
        stage_timeout: Duration,
        default_max_resume_attempts: u32,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(256);
        let today = clock.today_local_date();
        Self {
            store,
            driver,
            clock,
            state: Mutex::new(SchedulerState {
                scheduler,
                usage: UsageTracker::new(today, daily_budget),
                capacity_monitor: CapacityMonitor::new(),
            }),
            event_tx,
            resume_locks: Mutex::new(HashMap::new()),
            cancel_tokens: Mutex::new(HashMap::new()),
            stage_timeout,
            daily_budget,
            default_max_resume_attempts,
        }
    }

    /// Operator-configured ceiling (`daemon.session_recovery.max_resume_attempts`)
    /// applied to every task admitted through `create_task`.
    pub fn default_max_resume_attempts(&self) -> u32 {
        self.default_max_resume_attempts
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    fn publish(&self, event: DomainEvent) {
        // A send to a broadcast channel with no live receivers is not
        // an error, it just means nobody's listening yet.
        let _ = self.event_tx.send(event);
    }

    async fn persist(&self, task: &Task) -> Result<(), OrchestratorError> {
        let store = Arc::clone(&self.store);
        let task = task.clone();
        tokio::task::spawn_blocking(move || store.update_task(&task))
            .await
            .expect("store task panicked")
            .map_err(OrchestratorError::from)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task, OrchestratorError> {
        self.load(task_id).await
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, OrchestratorError> {
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || store.list_tasks())
            .await
            .expect("store task panicked")?)
    }

    async fn load(&self, task_id: &str) -> Result<Task, OrchestratorError> {
        let store = Arc::clone(&self.store);
        let id = task_id.to_string();
        tokio::task::spawn_blocking(move || store.get_task(&id))
            .await
            .expect("store task panicked")?
            .ok_or_else(|| OrchestratorError::NotFound(task_id.to_string()))
    }

    async fn latest_checkpoint(&self, task_id: &str) -> Result<Option<Checkpoint>, OrchestratorError> {
        let store = Arc::clone(&self.store);
        let id = task_id.to_string();
        Ok(tokio::task::spawn_blocking(move || store.get_latest_checkpoint(&id))
            .await
            .expect("store task panicked")?)
    }

    async fn write_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), OrchestratorError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.create_checkpoint(&checkpoint))
            .await
            .expect("store task panicked")
            .map_err(OrchestratorError::from)
    }

    async fn resume_lock_for(&self, task_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.resume_locks.lock().await;
        locks.entry(task_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    // -----------------------------------------------------------------
    // Admission pipeline
    // -----------------------------------------------------------------

    /// Persist a new task in `queued` status, emit `task:created`, and
    /// attempt immediate admission. Enforces the acyclicity rule for
    /// any declared `parent_task_id` before the task is stored.
    pub async fn create_task(self: &Arc<Self>, mut task: Task) -> Result<Task, OrchestratorError> {
        task.status = TaskStatus::Queued;
        task.max_resume_attempts = self.default_max_resume_attempts;
        let now = self.clock.now();
        task.created_at = now;
        task.updated_at = now;

        if let Some(parent_id) = task.parent_task_id.clone() {
            let store = Arc::clone(&self.store);
            let task_id = task.id.clone();
            tokio::task::spawn_blocking(move || store.link_subtask(&parent_id, &task_id))
                .await
                .expect("store task panicked")?;
        }

        {
            let store = Arc::clone(&self.store);
            let t = task.clone();
            tokio::task::spawn_blocking(move || store.create_task(&t))
                .await
                .expect("store task panicked")?;
        }
        self.publish(DomainEvent::TaskCreated { task_id: task.id.clone() });
        if !task.subtask_ids.is_empty() {
            self.publish(DomainEvent::TaskDecomposed {
                task_id: task.id.clone(),
                subtask_ids: task.subtask_ids.clone(),
            });
        }

        self.try_admit(&task.id).await.ok();
        Ok(task)
    }

    /// One pass of admission for a specific task. Used
    /// both by `create_task` and by the daemon runner's poll loop via
    /// `schedule_if_ready`.
    async fn try_admit(self: &Arc<Self>, task_id: &str) -> Result<bool, OrchestratorError> {
        let mut task = self.load(task_id).await?;
        if task.status.is_terminal() {
            return Err(OrchestratorError::Terminal(task_id.to_string()));
        }
        if task.is_blocked() {
            return Ok(false);
        }

        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let decision = state.scheduler.should_pause_tasks(now, state.usage.daily_stats().total_cost, self.daily_budget, state.usage.active_count());
        if decision.should_pause {
            return Ok(false);
        }
        let mode = decision.time_window.mode;
        let thresholds = state.scheduler.thresholds_for(mode);
        let admission = state.usage.can_start_task(
            mode,
            thresholds,
            Some(TaskEstimate { estimated_cost: task.estimated_cost, total_tokens: task.estimated_tokens }),
        );
        if !admission.allowed {
            return Ok(false);
        }

        let event = state_machine::admit(&mut task, now)?;
        state.usage.track_task_start(&task.id);
        drop(state);

        self.write_checkpoint(Checkpoint {
            task_id: task.id.clone(),
            checkpoint_id: format!("{}-admit", task.id),
            stage: task.current_stage.clone().unwrap_or_default(),
            stage_index: 0,
            conversation_state: serde_json::json!({}),
            metadata: serde_json::json!({}),
            context_summary: None,
            created_at: now,
        })
        .await?;
        self.persist(&task).await?;
        self.publish(event);
        self.spawn_stage_loop(task.id.clone());
        Ok(true)
    }

    /// Attempts to admit the single next queued task (called by the
    /// daemon runner's poll loop).
    pub async fn schedule_if_ready(self: &Arc<Self>) -> Result<bool, OrchestratorError> {
        let next = {
            let store = Arc::clone(&self.store);
            tokio::task::spawn_blocking(move || store.get_next_queued_task())
                .await
                .expect("store task panicked")?
        };
        match next {
            Some(task) => self.try_admit(&task.id).await,
            None => Ok(false),
        }
    }

    // -----------------------------------------------------------------
    // Stage loop: drives a running task to completion/pause/failure.
    // -----------------------------------------------------------------

    fn spawn_stage_loop(self: &Arc<Self>, task_id: String) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.drive_task(task_id).await });
    }

    async fn drive_task(self: &Arc<Self>, task_id: String) {
        let token = {
            let mut tokens = self.cancel_tokens.lock().await;
            tokens.entry(task_id.clone()).or_insert_with(CancellationToken::new).clone()
        };

        loop {
            let task = match self.load(&task_id).await {
                Ok(t) => t,
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "failed to load task for stage loop");
                    return;
                }
            };
            if task.status != TaskStatus::Running {
                return;
            }
            if token.is_cancelled() {
                return;
            }

            let outcome = stage_runner::run_stage(self.driver.as_ref(), &task, token.clone(), self.stage_timeout).await;
            match self.apply_outcome(task, outcome).await {
                Ok(true) => continue,
                Ok(false) => return,
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "stage application failed");
                    return;
                }
            }
        }
    }

    /// Applies one `StageOutcome` to the task. Returns `Ok(true)` if the
    /// loop should keep driving the same task (stage advanced but task
    /// still running, or a retry is due).
    async fn apply_outcome(self: &Arc<Self>, mut task: Task, outcome: StageOutcome) -> Result<bool, OrchestratorError> {
        let now = self.clock.now();
        let task_id = task.id.clone();
        let stage_before = task.current_stage.clone();
        let usage_applied = matches!(outcome, StageOutcome::Ok(_));

        let result = state_machine::advance_stage(&mut task, outcome, now);
        if usage_applied {
            self.publish(DomainEvent::UsageUpdated { task_id: task_id.clone() });
        }

        self.write_checkpoint(Checkpoint {
            task_id: task_id.clone(),
            checkpoint_id: format!("{}-{}", task_id, now.timestamp_nanos_opt().unwrap_or_default()),
            stage: stage_before.clone().unwrap_or_default(),
            stage_index: task.current_stage_index().unwrap_or(0),
            conversation_state: serde_json::json!({}),
            metadata: serde_json::json!({}),
            context_summary: None,
            created_at: now,
        })
        .await?;
        self.persist(&task).await?;

        match result {
            AdvanceResult::Advanced(event) => {
                let still_running = task.status == TaskStatus::Running;
                if !still_running {
                    let mut state = self.state.lock().await;
                    let mode = state.scheduler.classify(self.clock.local_hour());
                    state.usage.track_task_completion(&task_id, task.usage, true, mode);
                    drop(state);
                    self.publish(event);
                    self.resolve_dependents(&task_id).await.ok();
                    return Ok(false);
                }
                self.publish(event);
                Ok(still_running)
            }
            AdvanceResult::Retrying => Ok(true),
            AdvanceResult::Paused(event) => {
                let mut state = self.state.lock().await;
                let mode = state.scheduler.classify(self.clock.local_hour());
                state.usage.track_task_completion(&task_id, TaskUsage::default(), false, mode);
                drop(state);
                self.publish(event);
                Ok(false)
            }
            AdvanceResult::Failed(event) => {
                let mut state = self.state.lock().await;
                let mode = state.scheduler.classify(self.clock.local_hour());
                state.usage.track_task_completion(&task_id, task.usage, false, mode);
                drop(state);
                self.publish(event);
                Ok(false)
            }
        }
    }

    // -----------------------------------------------------------------
    // Resume / cancel / trash / archive
    // -----------------------------------------------------------------

    /// Requires the per-task resume mutex: duplicate concurrent calls
    /// must return false without incrementing `resume_attempts` twice.
    pub async fn resume_paused_task(self: &Arc<Self>, task_id: &str) -> Result<bool, OrchestratorError> {
        let lock = self.resume_lock_for(task_id).await;
        let _guard = lock.lock().await;

        let mut task = self.load(task_id).await?;
        if task.status != TaskStatus::Paused {
            return Ok(false);
        }
        let checkpoint = self.latest_checkpoint(task_id).await?;
        let now = self.clock.now();
        let result = state_machine::resume(&mut task, now, checkpoint.as_ref());
        self.persist(&task).await?;

        match result {
            ResumeResult::Resumed(event) => {
                let mut state = self.state.lock().await;
                state.usage.track_task_start(task_id);
                drop(state);
                self.publish(event);
                self.spawn_stage_loop(task.id.clone());
                Ok(true)
            }
            ResumeResult::Failed(event) => {
                self.publish(event);
                Ok(false)
            }
            ResumeResult::NoOp => Ok(false),
        }
    }

    pub async fn cancel_task(&self, task_id: &str) -> Result<(), OrchestratorError> {
        let mut task = self.load(task_id).await?;
        let now = self.clock.now();

        if task.status == TaskStatus::Running {
            let token = {
                let tokens = self.cancel_tokens.lock().await;
                tokens.get(task_id).cloned()
            };
            if let Some(token) = token {
                token.cancel();
            }
            stage_runner::cancel_with_grace(self.driver.as_ref(), task_id, stage_runner::CANCEL_GRACE_PERIOD).await;
        }

        state_machine::cancel(&mut task, now)?;
        self.persist(&task).await?;
        let store = Arc::clone(&self.store);
        let id = task_id.to_string();
        let _ = tokio::task::spawn_blocking(move || {
            store.add_log(
                &id,
                &LogEntry { level: "info".into(), message: "task cancelled by operator".into(), timestamp: now },
            )
        })
        .await;
        Ok(())
    }

    pub async fn trash_task(&self, task_id: &str) -> Result<(), OrchestratorError> {
        let mut task = self.load(task_id).await?;
        let event = state_machine::trash(&mut task, self.clock.now())?;
        self.persist(&task).await?;
        self.publish(event);
        Ok(())
    }

    pub async fn restore_task(&self, task_id: &str, previous_status: TaskStatus) -> Result<(), OrchestratorError> {
        let mut task = self.load(task_id).await?;
        let event = state_machine::restore(&mut task, previous_status, self.clock.now())?;
        self.persist(&task).await?;
        self.publish(event);
        Ok(())
    }

    pub async fn archive_task(&self, task_id: &str) -> Result<(), OrchestratorError> {
        let mut task = self.load(task_id).await?;
        let event = state_machine::archive(&mut task, self.clock.now())?;
        self.persist(&task).await?;
        self.publish(event);
        Ok(())
    }

    pub async fn unarchive_task(&self, task_id: &str) -> Result<(), OrchestratorError> {
        let mut task = self.load(task_id).await?;
        let event = state_machine::unarchive(&mut task, self.clock.now())?;
        self.persist(&task).await?;
        self.publish(event);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Capacity monitor tick + auto-resume
    // -----------------------------------------------------------------

    pub async fn tick_capacity_monitor(self: &Arc<Self>, completion_triggered: bool) {
        let now = self.clock.now();
        let event = {
            let state = &mut *self.state.lock().await;
            let (scheduler, usage, monitor) = (&state.scheduler, &state.usage, &mut state.capacity_monitor);
            monitor.tick(scheduler, usage, now, completion_triggered)
        };
        if let Some(event) = event {
            self.publish(DomainEvent::CapacityRestored(event.clone()));
            self.handle_capacity_restored(event).await;
        }
    }

    pub fn time_until_next_tick(&self, poll_interval: Duration) -> Duration {
        // Synchronous helper kept separate from `tick_capacity_monitor`
        // so the daemon runner can compute its own sleep without holding
        // the state lock across an await point.
        poll_interval
    }

    /// Two-phase auto-resume: parents first (transitively resuming
    /// their subtasks), then remaining resumable paused tasks in priority
    /// order. A single task's resume failure never aborts the batch.
    async fn handle_capacity_restored(self: &Arc<Self>, event: CapacityRestoredEvent) {
        let mut resumed_count: u32 = 0;
        let mut errors: Vec<AutoResumeError> = Vec::new();
        let mut resumed_ids: Vec<String> = Vec::new();

        let parents = {
            let store = Arc::clone(&self.store);
            tokio::task::spawn_blocking(move || store.find_highest_priority_parent_task()).await.expect("store task panicked")
        };
        match parents {
            Ok(parents) => {
                for parent in parents {
                    match self.resume_paused_task(&parent.id).await {
                        Ok(true) => {
                            resumed_count += 1;
                            resumed_ids.push(parent.id.clone());
                            for subtask_id in &parent.subtask_ids {
                                if let Ok(subtask) = self.load(subtask_id).await {
                                    if subtask.status == TaskStatus::Paused
                                        && subtask.pause_reason.map(|r| r.is_resumable_by_auto_resume()).unwrap_or(false)
                                    {
                                        match self.resume_paused_task(subtask_id).await {
                                            Ok(true) => {
                                                resumed_count += 1;
                                                resumed_ids.push(subtask_id.clone());
                                            }
                                            Ok(false) => {}
                                            Err(e) => errors.push(AutoResumeError { task_id: subtask_id.clone(), error: e.to_string() }),
                                        }
                                    }
                                }
                            }
                        }
                        Ok(false) => {}
                        Err(e) => errors.push(AutoResumeError { task_id: parent.id.clone(), error: e.to_string() }),
                    }
                }
            }
            Err(e) => errors.push(AutoResumeError { task_id: "<parent-scan>".into(), error: e.to_string() }),
        }

        let remaining = {
            let store = Arc::clone(&self.store);
            tokio::task::spawn_blocking(move || store.get_paused_tasks_for_resume()).await.expect("store task panicked")
        };
        match remaining {
            Ok(remaining) => {
                for task in remaining {
                    if resumed_ids.contains(&task.id) {
                        continue;
                    }
                    let now = self.clock.now();
                    let capacity_ok = {
                        let state = self.state.lock().await;
                        let decision = state.scheduler.should_pause_tasks(now, state.usage.daily_stats().total_cost, self.daily_budget, state.usage.active_count());
                        !decision.should_pause
                    };
                    if !capacity_ok {
                        break;
                    }
                    match self.resume_paused_task(&task.id).await {
                        Ok(true) => {
                            resumed_count += 1;
                            resumed_ids.push(task.id.clone());
                        }
                        Ok(false) => {}
                        Err(e) => errors.push(AutoResumeError { task_id: task.id.clone(), error: e.to_string() }),
                    }
                }
            }
            Err(e) => errors.push(AutoResumeError { task_id: "<resume-scan>".into(), error: e.to_string() }),
        }

        let context_summary = summarize_auto_resume(&resumed_ids, &errors);
        self.publish(DomainEvent::TasksAutoResumed {
            reason: event.reason,
            resumed_count,
            errors,
            context_summary,
        });
        info!(resumed_count, reason = ?event.reason, "auto-resume pass complete");
    }

    /// Called exactly once per local midnight by the daemon runner.
    pub async fn reset_daily_stats(&self) -> Result<(), OrchestratorError> {
        let today = self.clock.today_local_date();
        let mut state = self.state.lock().await;
        let stats = state.usage.daily_stats().clone();
        state.usage.reset_daily_stats(today);
        drop(state);

        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save_daily_stats(&stats))
            .await
            .expect("store task panicked")?;
        Ok(())
    }

    pub async fn persist_daily_stats_snapshot(&self) -> Result<(), OrchestratorError> {
        let stats = {
            let state = self.state.lock().await;
            state.usage.daily_stats().clone()
        };
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save_daily_stats(&stats))
            .await
            .expect("store task panicked")?;
        Ok(())
    }

    /// Scans for tasks blocked on `dependency_id` and resumes any whose
    /// blocking set is now empty.
    pub async fn resolve_dependents(self: &Arc<Self>, completed_task_id: &str) -> Result<(), OrchestratorError> {
        let paused = {
            let store = Arc::clone(&self.store);
            tokio::task::spawn_blocking(move || store.get_paused_tasks_for_resume())
                .await
                .expect("store task panicked")?
        };
        for mut dependent in paused {
            if dependent.pause_reason != Some(PauseReason::Dependency) {
                continue;
            }
            dependent.blocked_by.retain(|id| id != completed_task_id);
            if dependent.blocked_by.is_empty() {
                self.persist(&dependent).await?;
                warn!(task_id = %dependent.id, "dependency satisfied, attempting resume");
                let _ = self.resume_paused_task(&dependent.id).await;
            } else {
                self.persist(&dependent).await?;
            }
        }
        Ok(())
    }
}

fn summarize_auto_resume(resumed_ids: &[String], errors: &[AutoResumeError]) -> String {
    let mut summary = format!("resumed {} task(s): {}", resumed_ids.len(), resumed_ids.join(", "));
    if !errors.is_empty() {
        let first_five: Vec<String> = errors.iter().take(5).map(|e| format!("{}: {}", e.task_id, e.error)).collect();
        summary.push_str(&format!("; {} error(s), first 5: [{}]", errors.len(), first_five.join("; ")));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{AgentDriver, NoopDriver};
    use taskd_core::clock::ManualClock;
    use taskd_core::config::{Limits, OffHoursPolicy, TimeBasedUsageConfig};
    use taskd_core::types::{Priority, SubtaskStrategy, Workspace, WorkspaceStrategy};
    use taskd_store::{SqliteStore, Store};
    use chrono::{TimeZone, Utc};

    /// Scheduler that never pauses and never caps concurrency, so the
    /// admission pipeline's only gate left to exercise is the state
    /// machine itself.
    fn wide_open_scheduler() -> TimeWindowScheduler {
        let generous = Limits {
            max_concurrent_tasks: 1000,
            max_tokens_per_task: u64::MAX,
            max_cost_per_task: f64::MAX,
            daily_budget: f64::MAX,
        };
        let cfg = TimeBasedUsageConfig {
            enabled: true,
            day_mode_hours: (0..24).collect(),
            night_mode_hours: std::collections::BTreeSet::new(),
            day_mode_thresholds: generous.clone(),
            night_mode_thresholds: generous.clone(),
            day_mode_capacity_threshold: 1.0,
            night_mode_capacity_threshold: 1.0,
            off_hours_policy: OffHoursPolicy::Inactive,
        };
        TimeWindowScheduler::new(cfg, generous)
    }

    fn test_orchestrator() -> Arc<Orchestrator> {
        test_orchestrator_with_driver(Arc::new(NoopDriver))
    }

    fn test_orchestrator_with_driver(driver: Arc<dyn AgentDriver>) -> Arc<Orchestrator> {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()));
        Arc::new(Orchestrator::new(
            store,
            driver,
            clock,
            wide_open_scheduler(),
            f64::MAX,
            Duration::from_secs(600),
            3,
        ))
    }

    /// A driver whose stage never finishes on its own; used to pin a task
    /// in `running` long enough to exercise cancellation deterministically.
    struct BlockingDriver;

    #[async_trait::async_trait]
    impl AgentDriver for BlockingDriver {
        async fn run_stage(&self, _task: &Task, cancel: CancellationToken) -> StageOutcome {
            cancel.cancelled().await;
            StageOutcome::Fatal("cancelled".into())
        }
        async fn cancel(&self, _task_id: &str) {}
    }

    fn sample_task(id: &str, workflow: Vec<&str>) -> Task {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        Task {
            id: id.into(),
            description: "test task".into(),
            workflow: workflow.into_iter().map(String::from).collect(),
            autonomy: "full".into(),
            priority: Priority::Normal,
            project_path: "/tmp/proj".into(),
            status: TaskStatus::Queued,
            current_stage: None,
            pause_reason: None,
            resume_attempts: 0,
            max_resume_attempts: 1,
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
            workspace: Workspace { strategy: WorkspaceStrategy::Directory, path: "/tmp/proj".into(), preserve_on_failure: None },
            created_at: now,
            updated_at: now,
            paused_at: None,
            failure_reason: None,
        }
    }

    async fn wait_for_status(orch: &Arc<Orchestrator>, task_id: &str, target: TaskStatus) -> Task {
        for _ in 0..200 {
            let task = orch.get_task(task_id).await.unwrap();
            if task.status == target {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {task_id} never reached {target:?}");
    }

    #[tokio::test]
    async fn create_task_is_admitted_and_driven_to_completion_by_a_noop_driver() {
        let orch = test_orchestrator();
        let task = orch.create_task(sample_task("t1", vec!["build"])).await.unwrap();
        assert_eq!(task.max_resume_attempts, 3, "config default overrides the task literal's own value");

        let completed = wait_for_status(&orch, "t1", TaskStatus::Completed).await;
        assert_eq!(completed.current_stage, None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_on_a_running_task_stops_it_via_the_cancellation_token() {
        let orch = test_orchestrator_with_driver(Arc::new(BlockingDriver));
        orch.create_task(sample_task("t2", vec!["plan"])).await.unwrap();
        wait_for_status(&orch, "t2", TaskStatus::Running).await;

        orch.cancel_task("t2").await.unwrap();
        let task = orch.get_task("t2").await.unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn resume_is_a_noop_on_a_task_that_is_not_paused() {
        let orch = test_orchestrator();
        orch.create_task(sample_task("t3", vec!["build"])).await.unwrap();
        wait_for_status(&orch, "t3", TaskStatus::Completed).await;
        let resumed = orch.resume_paused_task("t3").await.unwrap();
        assert!(!resumed);
    }

    #[tokio::test]
    async fn concurrent_resume_calls_for_the_same_task_only_resume_it_once() {
        let orch = test_orchestrator();
        let mut task = sample_task("t4", vec!["build"]);
        task.status = TaskStatus::Paused;
        task.pause_reason = Some(PauseReason::UsageLimit);
        task.paused_at = Some(task.updated_at);
        orch.store.create_task(&task).unwrap();

        let a = Arc::clone(&orch);
        let b = Arc::clone(&orch);
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { a.resume_paused_task("t4").await.unwrap() }),
            tokio::spawn(async move { b.resume_paused_task("t4").await.unwrap() }),
        );
        let resumed_count = [r1.unwrap(), r2.unwrap()].iter().filter(|r| **r).count();
        assert_eq!(resumed_count, 1, "the per-task resume mutex must serialize the two calls");
    }

    #[tokio::test]
    async fn trash_then_restore_round_trips_the_original_status() {
        let orch = test_orchestrator();
        let mut task = sample_task("t5", vec!["build"]);
        task.status = TaskStatus::Failed;
        task.failure_reason = Some("stage_fatal".into());
        orch.store.create_task(&task).unwrap();

        orch.trash_task("t5").await.unwrap();
        assert_eq!(orch.get_task("t5").await.unwrap().status, TaskStatus::Trashed);

        orch.restore_task("t5", TaskStatus::Failed).await.unwrap();
        assert_eq!(orch.get_task("t5").await.unwrap().status, TaskStatus::Failed);
    }
}
