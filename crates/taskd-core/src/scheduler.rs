//! Time-Window Scheduler. Computes mode and pause decisions from
//! configuration alone — no persistence, no shared mutable state. A
//! pure struct over a config with a single entry point, easy to
//! property-test.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, Timelike, Utc};

use crate::config::{Limits, OffHoursPolicy, TimeBasedUsageConfig};
use crate::types::{CapacityInfo, Mode, TimeWindow, UsageThresholds};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReasonTag {
    OffHours,
    CapacityExceeded,
    ConcurrencyLimitReached,
}

#[derive(Debug, Clone)]
pub struct PauseDecision {
    pub should_pause: bool,
    pub reason: Option<PauseReasonTag>,
    pub message: String,
    pub time_window: TimeWindow,
    pub capacity: CapacityInfo,
}

pub struct TimeWindowScheduler {
    config: TimeBasedUsageConfig,
    base_limits: Limits,
}

impl TimeWindowScheduler {
    pub fn new(config: TimeBasedUsageConfig, base_limits: Limits) -> Self {
        Self { config, base_limits }
    }

    /// Mode classification at hour `h`. Day wins ties with night.
    pub fn classify(&self, hour: u32) -> Mode {
        if !self.config.enabled {
            return Mode::OffHours;
        }
        if self.config.day_hours_or_default().contains(&hour) {
            Mode::Day
        } else if self.config.night_hours_or_default().contains(&hour) {
            Mode::Night
        } else {
            Mode::OffHours
        }
    }

    pub fn thresholds_for(&self, mode: Mode) -> UsageThresholds {
        match mode {
            Mode::Day => self.config.day_mode_thresholds.as_thresholds(),
            Mode::Night => self.config.night_mode_thresholds.as_thresholds(),
            Mode::OffHours => match self.config.off_hours_policy {
                OffHoursPolicy::BaseLimits => self.base_limits.as_thresholds(),
                OffHoursPolicy::Inactive => UsageThresholds {
                    max_tokens_per_task: 0,
                    max_cost_per_task: 0.0,
                    max_concurrent_tasks: 0,
                },
            },
        }
    }

    fn capacity_threshold_for(&self, mode: Mode) -> f64 {
        match mode {
            Mode::Day => self.config.day_mode_capacity_threshold,
            Mode::Night => self.config.night_mode_capacity_threshold,
            Mode::OffHours => self.config.day_mode_capacity_threshold,
        }
    }

    /// All boundary hours at which classification could change.
    fn boundary_hours(&self) -> BTreeSet<u32> {
        let mut hours = BTreeSet::new();
        if self.config.enabled {
            hours.extend(self.config.day_hours_or_default());
            hours.extend(self.config.night_hours_or_default());
        }
        hours
    }

    pub fn get_current_time_window(&self, now: DateTime<Utc>) -> TimeWindow {
        let hour = now.hour();
        let mode = self.classify(hour);
        let next_transition = self.next_transition_after(now);
        TimeWindow {
            mode,
            is_active: mode != Mode::OffHours,
            next_transition,
        }
    }

    /// Find the smallest configured hour `h' > now.hour()` whose
    /// classification differs from the current hour's, scanning only the
    /// explicitly configured day/night hours so an unconfigured off-hours
    /// gap between two windows isn't itself reported as a transition;
    /// if none exists today, use the earliest differing boundary hour of
    /// tomorrow.
    fn next_transition_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let current_mode = self.classify(now.hour());
        let today: NaiveDate = now.date_naive();
        let boundaries = self.boundary_hours();

        for &h in boundaries.iter().filter(|&&h| h > now.hour()) {
            if self.classify(h) != current_mode {
                return midnight(today) + ChronoDuration::hours(h as i64);
            }
        }
        for &h in boundaries.iter() {
            if self.classify(h) != current_mode {
                let tomorrow = today.succ_opt().unwrap_or(today);
                return midnight(tomorrow) + ChronoDuration::hours(h as i64);
            }
        }
        // No boundary configured at all (e.g. every hour classifies the
        // same): the "transition" degenerates to next midnight.
        midnight(today.succ_opt().unwrap_or(today))
    }

    pub fn get_time_until_mode_switch(&self, now: DateTime<Utc>) -> ChronoDuration {
        self.next_transition_after(now) - now
    }

    /// Always positive, even exactly at the boundary.
    pub fn get_time_until_budget_reset(&self, now: DateTime<Utc>) -> ChronoDuration {
        let today = now.date_naive();
        let mut next_midnight = midnight(today.succ_opt().unwrap_or(today));
        if next_midnight <= now {
            next_midnight += ChronoDuration::days(1);
        }
        next_midnight - now
    }

    /// `threshold` is closed-above: `currentPercentage == threshold`
    /// counts as should-pause ( boundary behavior). `dailyBudget == 0`
    /// yields `+∞` percentage, i.e. always pause.
    pub fn get_capacity_info(&self, mode: Mode, daily_spent: f64, daily_budget: f64) -> CapacityInfo {
        let current_percentage = if daily_budget <= 0.0 {
            f64::INFINITY
        } else {
            daily_spent / daily_budget
        };
        let threshold = self.capacity_threshold_for(mode);
        CapacityInfo {
            current_percentage,
            threshold,
            should_pause: current_percentage >= threshold,
        }
    }

    pub fn should_pause_tasks(
        &self,
        now: DateTime<Utc>,
        daily_spent: f64,
        daily_budget: f64,
        active_count: u32,
    ) -> PauseDecision {
        let time_window = self.get_current_time_window(now);
        let capacity = self.get_capacity_info(time_window.mode, daily_spent, daily_budget);
        let thresholds = self.thresholds_for(time_window.mode);

        if time_window.mode == Mode::OffHours {
            return PauseDecision {
                should_pause: true,
                reason: Some(PauseReasonTag::OffHours),
                message: "outside configured day/night hours; off-hours is inactive".into(),
                time_window,
                capacity,
            };
        }
        if capacity.should_pause {
            return PauseDecision {
                should_pause: true,
                reason: Some(PauseReasonTag::CapacityExceeded),
                message: format!(
                    "daily spend {:.1}% of budget meets or exceeds the {:.1}% {:?}-mode threshold",
                    capacity.current_percentage * 100.0,
                    capacity.threshold * 100.0,
                    time_window.mode,
                ),
                time_window,
                capacity,
            };
        }
        if active_count >= thresholds.max_concurrent_tasks {
            return PauseDecision {
                should_pause: true,
                reason: Some(PauseReasonTag::ConcurrencyLimitReached),
                message: format!(
                    "active task count {active_count} has reached the {:?}-mode concurrency limit of {}",
                    time_window.mode, thresholds.max_concurrent_tasks,
                ),
                time_window,
                capacity,
            };
        }
        PauseDecision {
            should_pause: false,
            reason: None,
            message: String::new(),
            time_window,
            capacity,
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(date.and_time(NaiveTime::MIN), Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scheduler(day_hours: &[u32], night_hours: &[u32], day_t: f64, night_t: f64) -> TimeWindowScheduler {
        let cfg = TimeBasedUsageConfig {
            enabled: true,
            day_mode_hours: day_hours.iter().copied().collect(),
            night_mode_hours: night_hours.iter().copied().collect(),
            day_mode_thresholds: Limits {
                max_concurrent_tasks: 4,
                max_tokens_per_task: 100_000,
                max_cost_per_task: 5.0,
                daily_budget: 10.0,
            },
            night_mode_thresholds: Limits {
                max_concurrent_tasks: 8,
                max_tokens_per_task: 200_000,
                max_cost_per_task: 5.0,
                daily_budget: 10.0,
            },
            day_mode_capacity_threshold: day_t,
            night_mode_capacity_threshold: night_t,
            off_hours_policy: OffHoursPolicy::Inactive,
        };
        TimeWindowScheduler::new(
            cfg,
            Limits {
                max_concurrent_tasks: 1,
                max_tokens_per_task: 1,
                max_cost_per_task: 1.0,
                daily_budget: 1.0,
            },
        )
    }

    #[test]
    fn day_wins_on_overlap() {
        let s = scheduler(&[9, 10], &[9, 22], 0.7, 0.96);
        assert_eq!(s.classify(9), Mode::Day);
    }

    #[test]
    fn unconfigured_hour_is_off_hours() {
        let s = scheduler(&[9], &[22], 0.7, 0.96);
        assert_eq!(s.classify(12), Mode::OffHours);
    }

    #[test]
    fn disabled_time_based_usage_is_always_off_hours() {
        let mut s = scheduler(&[9], &[22], 0.7, 0.96);
        s.config.enabled = false;
        assert_eq!(s.classify(9), Mode::OffHours);
    }

    #[test]
    fn scenario_1_mode_switch_capacity() {
        // day=[15], night=[18], dayThreshold=0.70, budget 10.0, dailyCost=8.0 (80%)
        let s = scheduler(&[15], &[18], 0.70, 0.90);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 15, 0, 0).unwrap();
        let decision = s.should_pause_tasks(now, 8.0, 10.0, 0);
        assert!(decision.should_pause);
        assert_eq!(decision.reason, Some(PauseReasonTag::CapacityExceeded));

        let next_transition = s.get_current_time_window(now).next_transition;
        assert_eq!(next_transition, Utc.with_ymd_and_hms(2026, 1, 1, 18, 0, 0).unwrap());
    }

    #[test]
    fn capacity_percentage_equal_to_threshold_is_should_pause() {
        let s = scheduler(&[9], &[22], 0.70, 0.96);
        let info = s.get_capacity_info(Mode::Day, 7.0, 10.0);
        assert!((info.current_percentage - 0.70).abs() < 1e-9);
        assert!(info.should_pause);
    }

    #[test]
    fn zero_budget_is_always_pause() {
        let s = scheduler(&[9], &[22], 0.70, 0.96);
        let info = s.get_capacity_info(Mode::Day, 0.0, 0.0);
        assert!(info.current_percentage.is_infinite());
        assert!(info.should_pause);
    }

    #[test]
    fn budget_reset_is_always_positive_even_at_midnight() {
        let s = scheduler(&[9], &[22], 0.70, 0.96);
        let at_midnight = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let remaining = s.get_time_until_budget_reset(at_midnight);
        assert!(remaining > ChronoDuration::zero());
    }

    #[test]
    fn concurrency_limit_triggers_pause_when_capacity_is_fine() {
        let s = scheduler(&[9], &[22], 0.90, 0.96);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let decision = s.should_pause_tasks(now, 0.0, 10.0, 4);
        assert!(decision.should_pause);
        assert_eq!(decision.reason, Some(PauseReasonTag::ConcurrencyLimitReached));
    }

    #[test]
    fn off_hours_always_pauses_regardless_of_capacity() {
        let s = scheduler(&[9], &[22], 0.70, 0.96);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let decision = s.should_pause_tasks(now, 0.0, 10.0, 0);
        assert!(decision.should_pause);
        assert_eq!(decision.reason, Some(PauseReasonTag::OffHours));
    }

    proptest::proptest! {
        #[test]
        fn p8_time_window_is_pure_function_of_hour(hour in 0u32..24) {
            let s = scheduler(&[9, 10, 11], &[22, 23, 0, 1], 0.7, 0.96);
            let a = s.classify(hour);
            let b = s.classify(hour);
            proptest::prop_assert_eq!(a, b);
        }
    }
}
