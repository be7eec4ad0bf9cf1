use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UsageThresholds;

/// Time-of-day classification used to select `UsageThresholds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Day,
    Night,
    OffHours,
}

impl Mode {
    /// Permissiveness ordering used by the capacity monitor to decide
    /// whether a mode switch is "more permissive" (admits more work).
    /// Off-hours is the most restrictive, day and night are both more
    /// permissive than off-hours; day vs. night permissiveness is
    /// determined by their configured thresholds, not by this ordinal.
    pub fn is_more_permissive_than_off_hours(self) -> bool {
        !matches!(self, Mode::OffHours)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindow {
    pub mode: Mode,
    pub is_active: bool,
    pub next_transition: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CapacityInfo {
    pub current_percentage: f64,
    pub threshold: f64,
    pub should_pause: bool,
}

/// Reason a `CapacityRestoredEvent` was fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoredReason {
    ModeSwitch,
    BudgetReset,
    CapacityDropped,
    UsageExpired,
    ManualOverride,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityRestoredEvent {
    pub reason: RestoredReason,
    pub timestamp: DateTime<Utc>,
    pub previous_usage: f64,
    pub current_usage: f64,
    pub mode: Mode,
    pub thresholds: UsageThresholds,
}
