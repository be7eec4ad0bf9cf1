use serde::{Deserialize, Serialize};

/// Cumulative token/cost usage for a single task. Updated atomically by
/// the task state machine on every agent turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub estimated_cost: f64,
}

impl TaskUsage {
    /// Negative or NaN inputs are clamped to zero with the caller
    /// expected to log a warning.
    pub fn clamped(input_tokens: i64, output_tokens: i64, estimated_cost: f64) -> Self {
        let input_tokens = input_tokens.max(0) as u64;
        let output_tokens = output_tokens.max(0) as u64;
        let estimated_cost = if estimated_cost.is_finite() {
            estimated_cost.max(0.0)
        } else {
            0.0
        };
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            estimated_cost,
        }
    }

    pub fn add(&mut self, other: &TaskUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        self.estimated_cost += other.estimated_cost;
    }
}

/// Usage accumulated for one time-of-day mode within a single day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeUsage {
    pub tokens: u64,
    pub cost: f64,
    pub tasks: u64,
}

/// Daily-aggregate usage, owned by the Usage Tracker and reset at local
/// midnight. Kept in memory with periodic persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsageStats {
    /// Local calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub peak_concurrent_tasks: u32,
    pub day_mode: ModeUsage,
    pub night_mode: ModeUsage,
}

impl DailyUsageStats {
    pub fn new_for_date(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            total_tokens: 0,
            total_cost: 0.0,
            tasks_completed: 0,
            tasks_failed: 0,
            peak_concurrent_tasks: 0,
            day_mode: ModeUsage::default(),
            night_mode: ModeUsage::default(),
        }
    }
}

/// Resource thresholds in effect for a given mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageThresholds {
    pub max_tokens_per_task: u64,
    pub max_cost_per_task: f64,
    pub max_concurrent_tasks: u32,
}
