mod checkpoint;
mod task;
mod usage;
mod window;
mod workspace;

pub use checkpoint::Checkpoint;
pub use task::{PauseReason, Priority, SubtaskStrategy, Task, TaskStatus};
pub use usage::{DailyUsageStats, ModeUsage, TaskUsage, UsageThresholds};
pub use window::{CapacityInfo, CapacityRestoredEvent, Mode, RestoredReason, TimeWindow};
pub use workspace::{Workspace, WorkspaceStrategy};
