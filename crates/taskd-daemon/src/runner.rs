//! Daemon runner: owns process lifecycle around the orchestrator
//! -- the poll loop that drives admission and the capacity-monitor tick,
//! a watchdog over both, and graceful shutdown. A plain interval loop
//! spawned as one of several `tokio::select!` arms in `main.rs`, plus a
//! watchdog that remembers a bounded history of its own restarts.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sysinfo::{Pid, System};
use taskd_core::clock::Clock;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::Orchestrator;

pub const DEFAULT_RESTART_HISTORY_LEN: usize = 10;

/// Exit code an external supervisor should interpret as "restart me" --
/// matches the CLI surface's documented watchdog-triggered-restart code.
pub const WATCHDOG_EXIT_CODE: i32 = 137;

#[derive(Debug, Clone)]
pub struct RestartRecord {
    pub at: chrono::DateTime<chrono::Utc>,
    pub reason: String,
}

/// Bounded ring buffer of the watchdog's own restarts, kept for `status`
/// introspection. Oldest entries fall off once `capacity` is reached.
pub struct RestartHistory {
    entries: VecDeque<RestartRecord>,
    capacity: usize,
}

impl RestartHistory {
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, record: RestartRecord) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    pub fn snapshot(&self) -> Vec<RestartRecord> {
        self.entries.iter().cloned().collect()
    }
}

/// Resident-memory watchdog state. `system` is re-used across ticks so
/// each refresh only re-samples the current process, not the whole
/// machine.
struct MemoryWatchdog {
    system: System,
    pid: Pid,
    over_cap_ticks: u32,
}

impl MemoryWatchdog {
    fn new() -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(std::process::id()),
            over_cap_ticks: 0,
        }
    }

    /// Refresh this process's memory sample and return current RSS bytes.
    fn sample_rss_bytes(&mut self) -> u64 {
        self.system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[self.pid]));
        self.system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }
}

pub struct DaemonRunner {
    orchestrator: Arc<Orchestrator>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    shutdown_deadline: Duration,
    restart_history: Mutex<RestartHistory>,
    memory_cap_bytes: Option<u64>,
    memory_cap_consecutive_ticks: u32,
    watchdog: Mutex<MemoryWatchdog>,
    started_at: Instant,
}

impl DaemonRunner {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        shutdown_deadline: Duration,
    ) -> Self {
        Self::with_memory_cap(orchestrator, clock, poll_interval, shutdown_deadline, None, 3)
    }

    pub fn with_memory_cap(
        orchestrator: Arc<Orchestrator>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        shutdown_deadline: Duration,
        memory_cap_mb: Option<u64>,
        memory_cap_consecutive_ticks: u32,
    ) -> Self {
        Self {
            orchestrator,
            clock,
            poll_interval,
            shutdown_deadline,
            restart_history: Mutex::new(RestartHistory::new(DEFAULT_RESTART_HISTORY_LEN)),
            memory_cap_bytes: memory_cap_mb.map(|mb| mb * 1024 * 1024),
            memory_cap_consecutive_ticks,
            watchdog: Mutex::new(MemoryWatchdog::new()),
            started_at: Instant::now(),
        }
    }

    pub async fn restart_history(&self) -> Vec<RestartRecord> {
        self.restart_history.lock().await.snapshot()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Sample RSS against the configured cap. Returns `true` once the cap
    /// has been breached for `memory_cap_consecutive_ticks` ticks in a
    /// row, at which point the caller must exit the process so an
    /// external supervisor can restart it fresh.
    async fn check_memory_pressure(&self) -> bool {
        let Some(cap_bytes) = self.memory_cap_bytes else {
            return false;
        };
        let mut watchdog = self.watchdog.lock().await;
        let rss_bytes = watchdog.sample_rss_bytes();
        let uptime = self.uptime();

        if rss_bytes > cap_bytes {
            watchdog.over_cap_ticks += 1;
            tracing::warn!(
                rss_mb = rss_bytes / (1024 * 1024),
                cap_mb = cap_bytes / (1024 * 1024),
                consecutive_ticks = watchdog.over_cap_ticks,
                uptime_secs = uptime.as_secs(),
                "watchdog: resident memory over cap"
            );
        } else {
            if watchdog.over_cap_ticks > 0 {
                tracing::debug!("watchdog: resident memory back under cap, resetting counter");
            }
            watchdog.over_cap_ticks = 0;
        }

        watchdog.over_cap_ticks >= self.memory_cap_consecutive_ticks
    }

    /// Poll loop body: attempt to admit a single queued task, tick
    /// the capacity monitor, and roll over daily stats at local midnight.
    /// Runs until `cancel` fires or the memory watchdog forces an exit.
    pub async fn run_poll_loop(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll_interval);
        let mut last_date = self.clock.today_local_date();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.orchestrator.schedule_if_ready().await {
                        tracing::warn!(error = %e, "admission attempt failed");
                    }

                    let today = self.clock.today_local_date();
                    let rolled_over = today != last_date;
                    if rolled_over {
                        last_date = today;
                        if let Err(e) = self.orchestrator.reset_daily_stats().await {
                            tracing::error!(error = %e, "failed to persist daily stats at rollover");
                        }
                    } else if let Err(e) = self.orchestrator.persist_daily_stats_snapshot().await {
                        tracing::warn!(error = %e, "failed to persist daily stats snapshot");
                    }

                    self.orchestrator.tick_capacity_monitor(false).await;

                    if self.check_memory_pressure().await {
                        self.restart_history.lock().await.push(RestartRecord {
                            at: self.clock.now(),
                            reason: "memory-pressure".to_string(),
                        });
                        tracing::error!(
                            uptime_secs = self.uptime().as_secs(),
                            "watchdog: memory cap breached for too many consecutive ticks, exiting for supervisor restart"
                        );
                        std::process::exit(WATCHDOG_EXIT_CODE);
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("poll loop: cancellation requested, stopping");
                    return;
                }
            }
        }
    }

    /// Supervises `run_poll_loop`, restarting it on panic and recording
    /// each restart in the bounded history ( watchdog). A panic is the
    /// only trigger this layer restarts from in-process; a sustained
    /// memory-cap breach is handled inside `run_poll_loop` itself via
    /// `std::process::exit`, since only an external supervisor can give
    /// the process a truly fresh heap.
    pub async fn run_with_watchdog(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let this = Arc::clone(&self);
            let inner_cancel = cancel.clone();
            let result = tokio::spawn(async move { this.run_poll_loop(inner_cancel).await }).await;

            if cancel.is_cancelled() {
                return;
            }
            match result {
                Ok(()) => return,
                Err(join_err) => {
                    let reason = if join_err.is_panic() { "poll loop panicked".to_string() } else { "poll loop cancelled unexpectedly".to_string() };
                    tracing::error!(reason = %reason, "watchdog restarting poll loop");
                    self.restart_history.lock().await.push(RestartRecord { at: self.clock.now(), reason });
                }
            }
        }
    }

    /// Drains in-flight tasks by waiting up to `shutdown_deadline` for
    /// them to reach a terminal or paused state before returning control
    /// to the caller so it can remove the socket and exit.
    pub async fn graceful_shutdown(&self) {
        let deadline = tokio::time::Instant::now() + self.shutdown_deadline;
        loop {
            let tasks = match self.orchestrator.list_tasks().await {
                Ok(t) => t,
                Err(_) => return,
            };
            let in_flight = tasks.iter().filter(|t| t.status == taskd_core::types::TaskStatus::Running).count();
            if in_flight == 0 || tokio::time::Instant::now() >= deadline {
                if in_flight > 0 {
                    tracing::warn!(in_flight, "shutdown deadline reached with tasks still running");
                }
                return;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}
