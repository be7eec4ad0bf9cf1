//! Validated configuration record. Loaded from TOML by the daemon
//! binary; unknown fields are rejected at load time so a typo in an
//! operator's config file fails fast instead of silently doing nothing.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::TaskdError;
use crate::types::UsageThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffHoursPolicy {
    Inactive,
    BaseLimits,
}

impl Default for OffHoursPolicy {
    fn default() -> Self {
        OffHoursPolicy::Inactive
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    pub max_concurrent_tasks: u32,
    pub max_tokens_per_task: u64,
    pub max_cost_per_task: f64,
    pub daily_budget: f64,
}

impl Limits {
    pub fn as_thresholds(&self) -> UsageThresholds {
        UsageThresholds {
            max_tokens_per_task: self.max_tokens_per_task,
            max_cost_per_task: self.max_cost_per_task,
            max_concurrent_tasks: self.max_concurrent_tasks,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeBasedUsageConfig {
    pub enabled: bool,
    #[serde(default)]
    pub day_mode_hours: BTreeSet<u32>,
    #[serde(default)]
    pub night_mode_hours: BTreeSet<u32>,
    pub day_mode_thresholds: Limits,
    pub night_mode_thresholds: Limits,
    #[serde(default = "default_day_capacity_threshold")]
    pub day_mode_capacity_threshold: f64,
    #[serde(default = "default_night_capacity_threshold")]
    pub night_mode_capacity_threshold: f64,
    #[serde(default)]
    pub off_hours_policy: OffHoursPolicy,
}

fn default_day_capacity_threshold() -> f64 {
    0.70
}

fn default_night_capacity_threshold() -> f64 {
    0.96
}

impl TimeBasedUsageConfig {
    /// Empty hour sets fall back to `{9..17}` for day and
    /// `{22,23,0..6}` for night.
    pub fn day_hours_or_default(&self) -> BTreeSet<u32> {
        if self.day_mode_hours.is_empty() {
            (9..17).collect()
        } else {
            self.day_mode_hours.clone()
        }
    }

    pub fn night_hours_or_default(&self) -> BTreeSet<u32> {
        if self.night_mode_hours.is_empty() {
            let mut hours: BTreeSet<u32> = (0..7).collect();
            hours.insert(22);
            hours.insert(23);
            hours
        } else {
            self.night_mode_hours.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionRecoveryConfig {
    pub enabled: bool,
    #[serde(default = "default_max_resume_attempts")]
    pub max_resume_attempts: u32,
}

fn default_max_resume_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    pub session_recovery: SessionRecoveryConfig,
    #[serde(default = "default_shutdown_deadline_ms")]
    pub shutdown_deadline_ms: u64,
    /// Resident memory cap in MiB for the watchdog. `None` disables the
    /// memory-pressure restart path entirely.
    #[serde(default)]
    pub memory_cap_mb: Option<u64>,
    /// Consecutive over-cap poll ticks required before the watchdog
    /// exits for an external supervisor to restart the process.
    #[serde(default = "default_memory_cap_consecutive_ticks")]
    pub memory_cap_consecutive_ticks: u32,
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_shutdown_deadline_ms() -> u64 {
    30_000
}

fn default_memory_cap_consecutive_ticks() -> u32 {
    3
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorktreeConfig {
    #[serde(default)]
    pub cleanup_delay_ms: u64,
    #[serde(default)]
    pub preserve_on_failure: bool,
    #[serde(default)]
    pub max_worktrees: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitConfig {
    #[serde(default)]
    pub worktree: WorktreeConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub cleanup_on_complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    pub limits: Limits,
    pub time_based_usage: TimeBasedUsageConfig,
    pub daemon: DaemonSettings,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub git: GitConfig,
}

impl DaemonConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, TaskdError> {
        toml::from_str(raw).map_err(|e| TaskdError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), TaskdError> {
        let t = &self.time_based_usage;
        for (name, v) in [
            ("day_mode_capacity_threshold", t.day_mode_capacity_threshold),
            ("night_mode_capacity_threshold", t.night_mode_capacity_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(TaskdError::InvalidConfig(format!(
                    "{name} must be in [0.0, 1.0], got {v}"
                )));
            }
        }
        if self.limits.daily_budget < 0.0 {
            return Err(TaskdError::InvalidConfig("daily_budget must be >= 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
        [limits]
        max_concurrent_tasks = 4
        max_tokens_per_task = 100000
        max_cost_per_task = 5.0
        daily_budget = 10.0

        [time_based_usage]
        enabled = true
        day_mode_hours = [9, 10, 11]
        night_mode_hours = [22, 23]

        [time_based_usage.day_mode_thresholds]
        max_concurrent_tasks = 4
        max_tokens_per_task = 100000
        max_cost_per_task = 5.0
        daily_budget = 10.0

        [time_based_usage.night_mode_thresholds]
        max_concurrent_tasks = 8
        max_tokens_per_task = 200000
        max_cost_per_task = 5.0
        daily_budget = 10.0

        [daemon]
        [daemon.session_recovery]
        enabled = true
        "#
    }

    #[test]
    fn parses_and_validates_sample_config() {
        let cfg = DaemonConfig::from_toml_str(sample_toml()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.daemon.poll_interval_ms, 5_000);
        assert_eq!(cfg.daemon.session_recovery.max_resume_attempts, 3);
        assert_eq!(cfg.time_based_usage.day_mode_capacity_threshold, 0.70);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let mut raw = sample_toml().to_string();
        raw.push_str("\nbogus_field = true\n");
        assert!(DaemonConfig::from_toml_str(&raw).is_err());
    }

    #[test]
    fn out_of_range_capacity_threshold_fails_validation() {
        let mut cfg = DaemonConfig::from_toml_str(sample_toml()).unwrap();
        cfg.time_based_usage.night_mode_capacity_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_hour_sets_fall_back_to_documented_defaults() {
        let t = TimeBasedUsageConfig {
            enabled: true,
            day_mode_hours: BTreeSet::new(),
            night_mode_hours: BTreeSet::new(),
            day_mode_thresholds: Limits {
                max_concurrent_tasks: 1,
                max_tokens_per_task: 1,
                max_cost_per_task: 1.0,
                daily_budget: 1.0,
            },
            night_mode_thresholds: Limits {
                max_concurrent_tasks: 1,
                max_tokens_per_task: 1,
                max_cost_per_task: 1.0,
                daily_budget: 1.0,
            },
            day_mode_capacity_threshold: 0.7,
            night_mode_capacity_threshold: 0.96,
            off_hours_policy: OffHoursPolicy::Inactive,
        };
        assert_eq!(t.day_hours_or_default(), (9..17).collect());
        let nights = t.night_hours_or_default();
        assert!(nights.contains(&22) && nights.contains(&0) && !nights.contains(&9));
    }
}
