//! Stage runner: drives a task's current stage through the agent driver
//! and turns the result into a `StageOutcome`. Owns the per-stage
//! timeout (default 10 minutes) and the cooperative-cancel grace
//! period (5s).

use std::time::Duration;

use taskd_core::state_machine::StageOutcome;
use taskd_core::types::Task;

use crate::driver::AgentDriver;

pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Run `task`'s current stage, enforcing `stage_timeout`. A timeout is
/// treated as a non-retryable error since there is no
/// driver-reported signal to distinguish it from a genuine hang.
pub async fn run_stage(
    driver: &dyn AgentDriver,
    task: &Task,
    cancel: tokio_util::sync::CancellationToken,
    stage_timeout: Duration,
) -> StageOutcome {
    match tokio::time::timeout(stage_timeout, driver.run_stage(task, cancel)).await {
        Ok(outcome) => outcome,
        Err(_) => StageOutcome::Fatal(format!(
            "stage {} timed out after {:?}",
            task.current_stage.as_deref().unwrap_or("<none>"),
            stage_timeout
        )),
    }
}

/// Cancel a running stage and wait up to `grace_period` for the driver to
/// acknowledge before the caller gives up and forces the transition to
/// `cancelled` anyway.
pub async fn cancel_with_grace(driver: &dyn AgentDriver, task_id: &str, grace_period: Duration) {
    driver.cancel(task_id).await;
    tokio::time::sleep(grace_period).await;
}
