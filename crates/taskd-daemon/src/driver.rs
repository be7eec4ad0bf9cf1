//! Agent-driver contract: how a task's current stage actually gets run
//! is out of scope here, only the interface is fixed. The driver turns
//! its result into a `StageOutcome` rather than an `Err` the caller has
//! to match on, and supports best-effort cooperative cancellation.

use async_trait::async_trait;
use taskd_core::state_machine::StageOutcome;
use taskd_core::types::Task;

/// One invocation of the agent driver for a task's current stage.
#[async_trait]
pub trait AgentDriver: Send + Sync {
    /// Run `task.current_stage` to completion or failure. Must honor
    /// `cancel` cooperatively: once it fires, the driver should stop
    /// making forward progress and return promptly so the stage runner's
    /// grace period (default 5s) does not need to force a hang.
    async fn run_stage(&self, task: &Task, cancel: tokio_util::sync::CancellationToken) -> StageOutcome;

    /// Best-effort cancellation of an in-flight stage run for `task_id`.
    /// A no-op if the driver has no such stage in flight.
    async fn cancel(&self, task_id: &str);
}

/// A driver that always succeeds immediately with zero usage. Useful for
/// daemon wiring tests and as a placeholder until a real driver is
/// plugged in — the orchestrator and stage runner are driver-agnostic.
pub struct NoopDriver;

#[async_trait]
impl AgentDriver for NoopDriver {
    async fn run_stage(&self, _task: &Task, _cancel: tokio_util::sync::CancellationToken) -> StageOutcome {
        StageOutcome::Ok(taskd_core::types::TaskUsage::default())
    }

    async fn cancel(&self, _task_id: &str) {}
}
