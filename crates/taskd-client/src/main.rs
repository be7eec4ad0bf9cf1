use clap::{Parser, Subcommand};
use taskd_client::DaemonClient;
use taskd_core::types::{Priority, SubtaskStrategy, TaskStatus, Workspace, WorkspaceStrategy};
use taskd_daemon::rpc::CreateTaskParams;

const DEFAULT_SOCKET: &str = "/tmp/taskd/taskd.sock";

#[derive(Parser)]
#[command(name = "taskctl", about = "Control client for the taskd daemon")]
struct Cli {
    #[arg(long, global = true, default_value = DEFAULT_SOCKET)]
    socket: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a new task
    Create {
        description: String,
        project_path: String,
        #[arg(long, value_delimiter = ',')]
        workflow: Vec<String>,
        #[arg(long, default_value = "full")]
        autonomy: String,
        #[arg(long, default_value = "normal")]
        priority: String,
        #[arg(long)]
        parent_task_id: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        estimated_cost: f64,
        #[arg(long, default_value_t = 0)]
        estimated_tokens: u64,
    },
    /// Show task status (all tasks, or a single one by id)
    Status {
        task_id: Option<String>,
    },
    /// Ask the daemon to shut down gracefully
    Stop,
    /// Resume a paused task
    Resume { task_id: String },
    /// Cancel a queued or running task
    Cancel { task_id: String },
    /// Move a task to trash
    Trash { task_id: String },
    /// Restore a trashed task to a given prior status
    Restore {
        task_id: String,
        #[arg(long, default_value = "queued")]
        previous_status: String,
    },
    /// Move a terminal task to the archive
    Archive { task_id: String },
    /// Move an archived task back to its terminal status
    Unarchive { task_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut client = DaemonClient::connect(&cli.socket).await.map_err(|e| {
        eprintln!("failed to connect to daemon at {}: {e}", cli.socket);
        eprintln!("is the daemon running? start it with: taskd run");
        e
    })?;

    match cli.command {
        Commands::Create {
            description,
            project_path,
            workflow,
            autonomy,
            priority,
            parent_task_id,
            estimated_cost,
            estimated_tokens,
        } => {
            let params = CreateTaskParams {
                description,
                workflow,
                autonomy,
                priority: parse_priority(&priority)?,
                project_path: project_path.clone(),
                parent_task_id,
                subtask_strategy: SubtaskStrategy::Parallel,
                depends_on: vec![],
                workspace: Workspace { strategy: WorkspaceStrategy::Directory, path: project_path, preserve_on_failure: None },
                estimated_cost,
                estimated_tokens,
            };
            let task = client.create_task(params).await?;
            println!("created task {} ({:?})", task.id, task.status);
        }
        Commands::Status { task_id } => {
            let tasks = client.status(task_id).await?;
            for task in tasks {
                println!("{}\t{:?}\t{:?}\t{}", task.id, task.status, task.priority, task.description);
            }
        }
        Commands::Stop => {
            client.stop().await?;
            println!("stop requested");
        }
        Commands::Resume { task_id } => {
            client.resume(task_id.clone()).await?;
            println!("resumed {task_id}");
        }
        Commands::Cancel { task_id } => {
            client.cancel(task_id.clone()).await?;
            println!("cancelled {task_id}");
        }
        Commands::Trash { task_id } => {
            client.trash(task_id.clone()).await?;
            println!("trashed {task_id}");
        }
        Commands::Restore { task_id, previous_status } => {
            let status = parse_status(&previous_status)?;
            client.restore(task_id.clone(), status).await?;
            println!("restored {task_id}");
        }
        Commands::Archive { task_id } => {
            client.archive(task_id.clone()).await?;
            println!("archived {task_id}");
        }
        Commands::Unarchive { task_id } => {
            client.unarchive(task_id.clone()).await?;
            println!("unarchived {task_id}");
        }
    }

    Ok(())
}

fn parse_priority(raw: &str) -> anyhow::Result<Priority> {
    Ok(match raw {
        "low" => Priority::Low,
        "normal" => Priority::Normal,
        "high" => Priority::High,
        "urgent" => Priority::Urgent,
        other => anyhow::bail!("unknown priority: {other}"),
    })
}

fn parse_status(raw: &str) -> anyhow::Result<TaskStatus> {
    Ok(match raw {
        "queued" => TaskStatus::Queued,
        "running" => TaskStatus::Running,
        "paused" => TaskStatus::Paused,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "cancelled" => TaskStatus::Cancelled,
        other => anyhow::bail!("unknown status: {other}"),
    })
}
