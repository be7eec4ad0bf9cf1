//! Usage Tracker: single source of truth for in-flight usage.
//!
//! All mutation goes through `&mut self` — callers are responsible for
//! serializing access (the daemon crate holds this behind the
//! orchestrator's single state mutex rather than locking it here).

use std::collections::HashSet;

use crate::types::{DailyUsageStats, Mode, ModeUsage, TaskUsage, UsageThresholds};

#[derive(Debug, Clone, Copy)]
pub struct TaskEstimate {
    pub estimated_cost: f64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionReason {
    ConcurrencyLimit,
    DailyBudgetExhausted,
    EstimatedCostExceedsPerTaskLimit,
    EstimatedTokensExceedPerTaskLimit,
}

#[derive(Debug, Clone)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reason: Option<AdmissionReason>,
    pub thresholds: UsageThresholds,
}

#[derive(Debug, Clone)]
pub struct TimeBasedUsage {
    pub mode: Mode,
    pub thresholds: UsageThresholds,
    pub daily: DailyUsageStats,
    pub active_count: u32,
}

pub struct UsageTracker {
    active_tasks: HashSet<String>,
    daily: DailyUsageStats,
    daily_budget: f64,
}

impl UsageTracker {
    pub fn new(today: impl Into<String>, daily_budget: f64) -> Self {
        Self {
            active_tasks: HashSet::new(),
            daily: DailyUsageStats::new_for_date(today),
            daily_budget,
        }
    }

    pub fn active_count(&self) -> u32 {
        self.active_tasks.len() as u32
    }

    pub fn daily_stats(&self) -> &DailyUsageStats {
        &self.daily
    }

    /// Restore daily stats from a persisted snapshot (periodic
    /// persistence). Only valid for the same date;
    /// callers must call `reset_daily_stats` first if the date rolled.
    pub fn restore_daily_stats(&mut self, stats: DailyUsageStats) {
        self.daily = stats;
    }

    /// Idempotent on a duplicate id.
    pub fn track_task_start(&mut self, task_id: &str) {
        if self.active_tasks.insert(task_id.to_string()) {
            let count = self.active_count();
            if count > self.daily.peak_concurrent_tasks {
                self.daily.peak_concurrent_tasks = count;
            }
        }
    }

    pub fn track_task_completion(&mut self, task_id: &str, usage: TaskUsage, success: bool, mode: Mode) {
        self.active_tasks.remove(task_id);
        self.daily.total_tokens += usage.total_tokens;
        self.daily.total_cost += usage.estimated_cost;
        let mode_usage = self.mode_usage_mut(mode);
        mode_usage.tokens += usage.total_tokens;
        mode_usage.cost += usage.estimated_cost;
        mode_usage.tasks += 1;
        if success {
            self.daily.tasks_completed += 1;
        } else {
            self.daily.tasks_failed += 1;
        }
    }

    fn mode_usage_mut(&mut self, mode: Mode) -> &mut ModeUsage {
        match mode {
            Mode::Day => &mut self.daily.day_mode,
            Mode::Night | Mode::OffHours => &mut self.daily.night_mode,
        }
    }

    pub fn can_start_task(
        &self,
        mode: Mode,
        thresholds: UsageThresholds,
        estimate: Option<TaskEstimate>,
    ) -> AdmissionDecision {
        if self.active_count() >= thresholds.max_concurrent_tasks {
            return AdmissionDecision {
                allowed: false,
                reason: Some(AdmissionReason::ConcurrencyLimit),
                thresholds,
            };
        }
        if self.daily.total_cost >= self.daily_budget {
            return AdmissionDecision {
                allowed: false,
                reason: Some(AdmissionReason::DailyBudgetExhausted),
                thresholds,
            };
        }
        if let Some(est) = estimate {
            if est.estimated_cost > thresholds.max_cost_per_task {
                return AdmissionDecision {
                    allowed: false,
                    reason: Some(AdmissionReason::EstimatedCostExceedsPerTaskLimit),
                    thresholds,
                };
            }
            if est.total_tokens > thresholds.max_tokens_per_task {
                return AdmissionDecision {
                    allowed: false,
                    reason: Some(AdmissionReason::EstimatedTokensExceedPerTaskLimit),
                    thresholds,
                };
            }
        }
        let _ = mode;
        AdmissionDecision {
            allowed: true,
            reason: None,
            thresholds,
        }
    }

    pub fn get_current_usage(&self, mode: Mode, thresholds: UsageThresholds) -> TimeBasedUsage {
        TimeBasedUsage {
            mode,
            thresholds,
            daily: self.daily.clone(),
            active_count: self.active_count(),
        }
    }

    /// Called exactly once per local midnight by the daemon runner.
    pub fn reset_daily_stats(&mut self, new_date: impl Into<String>) {
        self.daily = DailyUsageStats::new_for_date(new_date);
    }

    pub fn daily_budget(&self) -> f64 {
        self.daily_budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> UsageThresholds {
        UsageThresholds {
            max_tokens_per_task: 100_000,
            max_cost_per_task: 5.0,
            max_concurrent_tasks: 2,
        }
    }

    #[test]
    fn duplicate_start_is_idempotent() {
        let mut t = UsageTracker::new("2026-01-01", 10.0);
        t.track_task_start("a");
        t.track_task_start("a");
        assert_eq!(t.active_count(), 1);
    }

    #[test]
    fn rejects_when_concurrency_exhausted() {
        let mut t = UsageTracker::new("2026-01-01", 10.0);
        t.track_task_start("a");
        t.track_task_start("b");
        let d = t.can_start_task(Mode::Day, thresholds(), None);
        assert!(!d.allowed);
        assert_eq!(d.reason, Some(AdmissionReason::ConcurrencyLimit));
    }

    #[test]
    fn rejects_when_daily_budget_exhausted_closed_above() {
        let mut t = UsageTracker::new("2026-01-01", 1.0);
        t.track_task_completion(
            "x",
            TaskUsage {
                estimated_cost: 1.0,
                ..Default::default()
            },
            true,
            Mode::Day,
        );
        let d = t.can_start_task(Mode::Day, thresholds(), None);
        assert!(!d.allowed);
        assert_eq!(d.reason, Some(AdmissionReason::DailyBudgetExhausted));
    }

    #[test]
    fn rejects_estimate_over_per_task_cost_limit() {
        let t = UsageTracker::new("2026-01-01", 10.0);
        let est = TaskEstimate {
            estimated_cost: 6.0,
            total_tokens: 10,
        };
        let d = t.can_start_task(Mode::Day, thresholds(), Some(est));
        assert_eq!(d.reason, Some(AdmissionReason::EstimatedCostExceedsPerTaskLimit));
    }

    #[test]
    fn peak_concurrency_tracks_high_water_mark() {
        let mut t = UsageTracker::new("2026-01-01", 10.0);
        t.track_task_start("a");
        t.track_task_start("b");
        t.track_task_completion("a", TaskUsage::default(), true, Mode::Day);
        assert_eq!(t.daily_stats().peak_concurrent_tasks, 2);
        assert_eq!(t.active_count(), 1);
    }

    #[test]
    fn completion_updates_mode_breakdown() {
        let mut t = UsageTracker::new("2026-01-01", 10.0);
        t.track_task_start("a");
        t.track_task_completion(
            "a",
            TaskUsage {
                total_tokens: 500,
                estimated_cost: 0.5,
                ..Default::default()
            },
            true,
            Mode::Night,
        );
        assert_eq!(t.daily_stats().night_mode.tokens, 500);
        assert_eq!(t.daily_stats().day_mode.tokens, 0);
        assert_eq!(t.daily_stats().tasks_completed, 1);
    }

    #[test]
    fn reset_clears_totals_but_not_active_set() {
        let mut t = UsageTracker::new("2026-01-01", 10.0);
        t.track_task_start("a");
        t.track_task_completion("a", TaskUsage::default(), false, Mode::Day);
        assert_eq!(t.daily_stats().tasks_failed, 1);
        t.track_task_start("b");
        t.reset_daily_stats("2026-01-02");
        assert_eq!(t.daily_stats().tasks_failed, 0);
        assert_eq!(t.daily_stats().date, "2026-01-02");
        assert_eq!(t.active_count(), 1);
    }
}
