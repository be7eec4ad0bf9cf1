//! Capacity Monitor & Auto-Resume Controller. Cooperative,
//! single-threaded: it only ever runs on the orchestrator's main loop via
//! `tick()`, under the same "single mutex, never held across an
//! agent-driver call" discipline the orchestrator applies to its other
//! mutable state.

use chrono::{DateTime, Datelike, Utc};
use taskd_core::scheduler::TimeWindowScheduler;
use taskd_core::types::{CapacityRestoredEvent, Mode, RestoredReason};
use taskd_core::usage::UsageTracker;

/// Snapshot of the decision inputs as of the last tick, used to detect
/// transitions on the next one.
struct LastDecision {
    mode: Mode,
    should_pause: bool,
    active_count: u32,
    local_date: chrono::NaiveDate,
}

pub struct CapacityMonitor {
    last: Option<LastDecision>,
}

impl Default for CapacityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl CapacityMonitor {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Re-query the scheduler and usage tracker and return at most one
    /// `CapacityRestoredEvent` for the transition observed since the
    /// previous tick. `usage_expired` takes precedence over
    /// `capacity_dropped` when `completion_triggered` is set; the two
    /// are coalesced at the emission site.
    pub fn tick(
        &mut self,
        scheduler: &TimeWindowScheduler,
        usage: &UsageTracker,
        now: DateTime<Utc>,
        completion_triggered: bool,
    ) -> Option<CapacityRestoredEvent> {
        let mode = scheduler.classify(now_hour(now));
        let capacity = scheduler.get_capacity_info(mode, usage.daily_stats().total_cost, usage.daily_budget());
        let thresholds = scheduler.thresholds_for(mode);
        let active_count = usage.active_count();
        let should_pause = capacity.should_pause || mode == Mode::OffHours || active_count >= thresholds.max_concurrent_tasks;
        let today = now.date_naive();

        let event = match self.last.as_ref() {
            None => None,
            Some(prev) => {
                if prev.local_date != today {
                    Some(RestoredReason::BudgetReset)
                } else if prev.mode != mode && is_more_permissive(prev.mode, mode) {
                    Some(RestoredReason::ModeSwitch)
                } else if prev.should_pause && !should_pause {
                    if completion_triggered {
                        Some(RestoredReason::UsageExpired)
                    } else {
                        Some(RestoredReason::CapacityDropped)
                    }
                } else if prev.active_count >= thresholds.max_concurrent_tasks && active_count < thresholds.max_concurrent_tasks {
                    Some(RestoredReason::CapacityDropped)
                } else {
                    None
                }
            }
        };

        let previous_cost = self.last.as_ref().map(|_| usage.daily_stats().total_cost).unwrap_or(0.0);
        self.last = Some(LastDecision { mode, should_pause, active_count, local_date: today });

        event.map(|reason| CapacityRestoredEvent {
            reason,
            timestamp: now,
            previous_usage: previous_cost,
            current_usage: usage.daily_stats().total_cost,
            mode,
            thresholds,
        })
    }

    /// Raise a `manual_override` event unconditionally, bypassing
    /// transition detection.
    pub fn manual_override(
        &self,
        scheduler: &TimeWindowScheduler,
        usage: &UsageTracker,
        mode: Mode,
        now: DateTime<Utc>,
    ) -> CapacityRestoredEvent {
        CapacityRestoredEvent {
            reason: RestoredReason::ManualOverride,
            timestamp: now,
            previous_usage: usage.daily_stats().total_cost,
            current_usage: usage.daily_stats().total_cost,
            mode,
            thresholds: scheduler.thresholds_for(mode),
        }
    }
}

fn is_more_permissive(from: Mode, to: Mode) -> bool {
    matches!(
        (from, to),
        (Mode::OffHours, Mode::Day) | (Mode::OffHours, Mode::Night) | (Mode::Day, Mode::Night)
    )
}

fn now_hour(now: DateTime<Utc>) -> u32 {
    use chrono::Timelike;
    now.hour()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;
    use taskd_core::config::{Limits, OffHoursPolicy, TimeBasedUsageConfig};

    fn scheduler() -> TimeWindowScheduler {
        let limits = Limits {
            max_concurrent_tasks: 4,
            max_tokens_per_task: 100_000,
            max_cost_per_task: 5.0,
            daily_budget: 10.0,
        };
        TimeWindowScheduler::new(
            TimeBasedUsageConfig {
                enabled: true,
                day_mode_hours: BTreeSet::from([15]),
                night_mode_hours: BTreeSet::from([18]),
                day_mode_thresholds: limits.clone(),
                night_mode_thresholds: limits.clone(),
                day_mode_capacity_threshold: 0.70,
                night_mode_capacity_threshold: 0.90,
                off_hours_policy: OffHoursPolicy::Inactive,
            },
            limits,
        )
    }

    #[test]
    fn mode_switch_from_over_capacity_emits_once() {
        let s = scheduler();
        let mut tracker = UsageTracker::new("2026-01-01", 10.0);
        tracker.track_task_completion(
            "t",
            taskd_core::types::TaskUsage { estimated_cost: 8.0, ..Default::default() },
            true,
            Mode::Day,
        );
        let mut monitor = CapacityMonitor::new();

        let at_15 = Utc.with_ymd_and_hms(2026, 1, 1, 15, 0, 0).unwrap();
        assert!(monitor.tick(&s, &tracker, at_15, false).is_none());

        let at_18 = Utc.with_ymd_and_hms(2026, 1, 1, 18, 0, 0).unwrap();
        let event = monitor.tick(&s, &tracker, at_18, false).unwrap();
        assert_eq!(event.reason, RestoredReason::ModeSwitch);
    }

    #[test]
    fn midnight_rollover_emits_budget_reset() {
        let s = scheduler();
        let tracker = UsageTracker::new("2026-01-01", 10.0);
        let mut monitor = CapacityMonitor::new();

        let before = Utc.with_ymd_and_hms(2026, 1, 1, 23, 59, 0).unwrap();
        monitor.tick(&s, &tracker, before, false);

        let after = Utc.with_ymd_and_hms(2026, 1, 2, 0, 1, 0).unwrap();
        let event = monitor.tick(&s, &tracker, after, false).unwrap();
        assert_eq!(event.reason, RestoredReason::BudgetReset);
    }

    #[test]
    fn no_transition_emits_nothing() {
        let s = scheduler();
        let tracker = UsageTracker::new("2026-01-01", 10.0);
        let mut monitor = CapacityMonitor::new();
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 15, 0, 0).unwrap();
        monitor.tick(&s, &tracker, t, false);
        assert!(monitor.tick(&s, &tracker, t, false).is_none());
    }
}
