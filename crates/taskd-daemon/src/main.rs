use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use taskd_core::clock::SystemClock;
use taskd_core::config::DaemonConfig;
use taskd_core::scheduler::TimeWindowScheduler;
use tokio_util::sync::CancellationToken;

use taskd_daemon::driver::NoopDriver;
use taskd_daemon::orchestrator::Orchestrator;
use taskd_daemon::runner::DaemonRunner;
use taskd_daemon::server::DaemonServer;

const DEFAULT_SOCKET_DIR: &str = "/tmp/taskd";
const DEFAULT_SOCKET: &str = "/tmp/taskd/taskd.sock";
const DEFAULT_CONFIG_PATH: &str = "/etc/taskd/config.toml";
const DEFAULT_DB_PATH: &str = "/tmp/taskd/taskd.db";

#[derive(Parser)]
#[command(name = "taskd", about = "Autonomous AI task execution daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (default when no subcommand given)
    Run {
        #[arg(long, default_value = DEFAULT_SOCKET)]
        socket: String,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let (socket, config_path, db_path) = match cli.command {
        None => (DEFAULT_SOCKET.to_string(), DEFAULT_CONFIG_PATH.to_string(), DEFAULT_DB_PATH.to_string()),
        Some(Commands::Run { socket, config, db }) => (socket, config, db),
    };
    run_daemon(socket, config_path, db_path).await?;
    Ok(())
}

async fn run_daemon(socket: String, config_path: String, db_path: String) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(socket = %socket, config = %config_path, db = %db_path, "starting taskd daemon");

    let socket_dir = PathBuf::from(DEFAULT_SOCKET_DIR);
    std::fs::create_dir_all(&socket_dir)?;

    let raw_config = std::fs::read_to_string(&config_path).map_err(|e| {
        format!("failed to read config at {config_path}: {e}")
    })?;
    let config = DaemonConfig::from_toml_str(&raw_config)?;
    config.validate()?;

    let store = Arc::new(taskd_store::SqliteStore::open(std::path::Path::new(&db_path))?);
    let clock = Arc::new(SystemClock);
    let driver = Arc::new(NoopDriver);
    let scheduler = TimeWindowScheduler::new(config.time_based_usage.clone(), config.limits.clone());

    let orchestrator = Arc::new(Orchestrator::new(
        store,
        driver,
        clock.clone(),
        scheduler,
        config.limits.daily_budget,
        Duration::from_secs(10 * 60),
        config.daemon.session_recovery.max_resume_attempts,
    ));

    let server_cancel = CancellationToken::new();
    let server = DaemonServer::new(&socket, Arc::clone(&orchestrator), server_cancel.clone());

    let runner = Arc::new(DaemonRunner::with_memory_cap(
        Arc::clone(&orchestrator),
        clock,
        Duration::from_millis(config.daemon.poll_interval_ms),
        Duration::from_millis(config.daemon.shutdown_deadline_ms),
        config.daemon.memory_cap_mb,
        config.daemon.memory_cap_consecutive_ticks,
    ));
    let runner_cancel = CancellationToken::new();

    tracing::info!("all components created, starting event loops");

    tokio::select! {
        result = server.run() => {
            match result {
                Ok(()) => tracing::warn!("server exited unexpectedly"),
                Err(e) => tracing::warn!("server error: {e}"),
            }
        }
        _ = Arc::clone(&runner).run_with_watchdog(runner_cancel.clone()) => {
            tracing::warn!("daemon runner exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    runner_cancel.cancel();
    server_cancel.cancel();
    runner.graceful_shutdown().await;

    let socket_path = PathBuf::from(&socket);
    if socket_path.exists() {
        if let Err(e) = std::fs::remove_file(&socket_path) {
            tracing::warn!(path = %socket_path.display(), "failed to remove socket file: {e}");
        }
    }

    tracing::info!("taskd daemon stopped");
    Ok(())
}
