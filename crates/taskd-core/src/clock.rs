//! Monotonic + wall-clock time provider, injectable for tests.
//!
//! Nothing else in this crate is allowed to read the system clock
//! directly — all time enters through a `Clock` so scheduler and usage
//! tests can drive specific hours/dates deterministically.

use chrono::{DateTime, Datelike, Timelike, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Local wall-clock hour, 0..23. Treats process-local time as *the*
    /// configured timezone; multi-timezone deployments are out of scope.
    fn local_hour(&self) -> u32 {
        self.now().hour()
    }

    fn today_local_date(&self) -> String {
        self.now().format("%Y-%m-%d").to_string()
    }
}

/// Production clock backed by the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock that can be advanced explicitly. `local_hour`/`today_local_date`
/// are derived from the same injected instant, treating it as local time
/// (tests construct instants already expressed in the timezone under test).
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: std::sync::Arc::new(std::sync::Mutex::new(start)),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.current.lock().unwrap() = instant;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.current.lock().unwrap();
        *guard += delta;
    }

    /// Advance to the next instant at which `local_hour() == target_hour`,
    /// wrapping to the next day if `target_hour <= local_hour()`.
    pub fn advance_to_hour(&self, target_hour: u32) {
        let mut guard = self.current.lock().unwrap();
        let mut next = guard.date_naive().and_hms_opt(target_hour, 0, 0).unwrap();
        if next <= guard.naive_utc() {
            next += chrono::Duration::days(1);
        }
        *guard = DateTime::from_naive_utc_and_offset(next, Utc);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances_to_next_occurrence_of_hour() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 15, 30, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance_to_hour(18);
        assert_eq!(clock.local_hour(), 18);
        assert_eq!(clock.today_local_date(), "2026-01-01");
    }

    #[test]
    fn manual_clock_wraps_to_next_day_when_hour_already_passed() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 22, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance_to_hour(9);
        assert_eq!(clock.today_local_date(), "2026-01-02");
        assert_eq!(clock.local_hour(), 9);
    }
}
