//! Unix-socket JSON-RPC server exposing the CLI surface: newline-
//! delimited JSON, one task per client, `tokio::select!` between the
//! next request line and the next event-bus push.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use taskd_core::events::DomainEvent;
use taskd_core::types::{Task, TaskStatus};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::Orchestrator;
use crate::rpc::*;

pub struct DaemonServer {
    socket_path: PathBuf,
    orchestrator: Arc<Orchestrator>,
    cancel: CancellationToken,
}

impl DaemonServer {
    pub fn new(socket_path: impl Into<PathBuf>, orchestrator: Arc<Orchestrator>, cancel: CancellationToken) -> Self {
        Self { socket_path: socket_path.into(), orchestrator, cancel }
    }

    pub async fn run(self) -> std::io::Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        cleanup_socket(&self.socket_path).await;

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!(path = %self.socket_path.display(), "daemon server listening");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let orchestrator = Arc::clone(&self.orchestrator);
                            let notify_rx = orchestrator.subscribe();
                            let cancel = self.cancel.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(stream, orchestrator, notify_rx, cancel).await {
                                    tracing::debug!(error = %e, "client handler finished with error");
                                }
                            });
                        }
                        Err(e) => tracing::error!(error = %e, "accept failed"),
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("daemon server: cancellation requested, shutting down");
                    break;
                }
            }
        }

        cleanup_socket(&self.socket_path).await;
        Ok(())
    }
}

async fn handle_client(
    stream: UnixStream,
    orchestrator: Arc<Orchestrator>,
    mut notify_rx: broadcast::Receiver<DomainEvent>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut subscribed_events: Vec<String> = Vec::new();

    tracing::debug!("client connected");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(l)) => l,
                    Ok(None) => {
                        tracing::debug!("client disconnected (EOF)");
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "read error, dropping client");
                        return Err(e);
                    }
                };

                let req: JsonRpcRequest = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(e) => {
                        write_json(&mut writer, &error_response(None, ERR_PARSE, format!("parse error: {e}"))).await?;
                        continue;
                    }
                };

                let resp = dispatch(&orchestrator, &req, &mut subscribed_events, &cancel).await;
                write_json(&mut writer, &resp).await?;
            }

            event = notify_rx.recv() => {
                let event = match event {
                    Ok(e) => e,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "client lagged, dropped events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("event bus closed, dropping client");
                        return Ok(());
                    }
                };
                if subscribed_events.is_empty() || subscribed_events.iter().any(|e| e == "*") {
                    let notif = event_to_notification(&event);
                    if let Err(e) = write_json(&mut writer, &notif).await {
                        tracing::debug!(error = %e, "failed to push event, dropping client");
                        return Err(e);
                    }
                }
            }
        }
    }
}

async fn dispatch(
    orchestrator: &Arc<Orchestrator>,
    req: &JsonRpcRequest,
    subscribed_events: &mut Vec<String>,
    cancel: &CancellationToken,
) -> JsonRpcResponse {
    match req.method.as_str() {
        METHOD_STOP => {
            tracing::info!("stop requested over the CLI surface, shutting down");
            cancel.cancel();
            ok_response(req.id, serde_json::to_value(OkResult { ok: true }).unwrap())
        }
        METHOD_CREATE_TASK => {
            let params: CreateTaskParams = match serde_json::from_value(req.params.clone()) {
                Ok(p) => p,
                Err(e) => return error_response(req.id, ERR_INVALID_PARAMS, e.to_string()),
            };
            let task = new_task_from_params(params);
            match orchestrator.create_task(task).await {
                Ok(task) => ok_response(req.id, serde_json::to_value(CreateTaskResult { task }).unwrap()),
                Err(e) => error_response(req.id, ERR_INTERNAL, e.to_string()),
            }
        }
        METHOD_STATUS => {
            let params: StatusParams = serde_json::from_value(req.params.clone()).unwrap_or_default();
            let result = match params.task_id {
                Some(id) => orchestrator.get_task(&id).await.map(|t| vec![t]),
                None => orchestrator.list_tasks().await,
            };
            match result {
                Ok(tasks) => ok_response(req.id, serde_json::to_value(StatusResult { tasks }).unwrap()),
                Err(crate::orchestrator::OrchestratorError::NotFound(id)) => {
                    error_response(req.id, ERR_TASK_NOT_FOUND, format!("task not found: {id}"))
                }
                Err(e) => error_response(req.id, ERR_INTERNAL, e.to_string()),
            }
        }
        METHOD_RESUME => with_task_id(orchestrator, req, |o, id| async move { o.resume_paused_task(&id).await.map(|_| ()) }).await,
        METHOD_CANCEL => with_task_id(orchestrator, req, |o, id| async move { o.cancel_task(&id).await }).await,
        METHOD_TRASH => with_task_id(orchestrator, req, |o, id| async move { o.trash_task(&id).await }).await,
        METHOD_ARCHIVE => with_task_id(orchestrator, req, |o, id| async move { o.archive_task(&id).await }).await,
        METHOD_UNARCHIVE => with_task_id(orchestrator, req, |o, id| async move { o.unarchive_task(&id).await }).await,
        METHOD_RESTORE => {
            let params: RestoreParams = match serde_json::from_value(req.params.clone()) {
                Ok(p) => p,
                Err(e) => return error_response(req.id, ERR_INVALID_PARAMS, e.to_string()),
            };
            match orchestrator.restore_task(&params.task_id, params.previous_status).await {
                Ok(()) => ok_response(req.id, serde_json::to_value(OkResult { ok: true }).unwrap()),
                Err(e) => error_response(req.id, ERR_INTERNAL, e.to_string()),
            }
        }
        METHOD_SUBSCRIBE => {
            let params: SubscribeParams = serde_json::from_value(req.params.clone()).unwrap_or_default();
            *subscribed_events = params.events;
            ok_response(req.id, serde_json::to_value(OkResult { ok: true }).unwrap())
        }
        other => error_response(req.id, ERR_METHOD_NOT_FOUND, format!("method not found: {other}")),
    }
}

async fn with_task_id<F, Fut>(orchestrator: &Arc<Orchestrator>, req: &JsonRpcRequest, f: F) -> JsonRpcResponse
where
    F: FnOnce(Arc<Orchestrator>, String) -> Fut,
    Fut: std::future::Future<Output = Result<(), crate::orchestrator::OrchestratorError>>,
{
    let params: TaskIdParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(e) => return error_response(req.id, ERR_INVALID_PARAMS, e.to_string()),
    };
    match f(Arc::clone(orchestrator), params.task_id).await {
        Ok(()) => ok_response(req.id, serde_json::to_value(OkResult { ok: true }).unwrap()),
        Err(crate::orchestrator::OrchestratorError::NotFound(id)) => {
            error_response(req.id, ERR_TASK_NOT_FOUND, format!("task not found: {id}"))
        }
        Err(crate::orchestrator::OrchestratorError::Terminal(id)) => {
            error_response(req.id, ERR_TASK_TERMINAL, format!("task is terminal: {id}"))
        }
        Err(e) => error_response(req.id, ERR_INTERNAL, e.to_string()),
    }
}

fn new_task_from_params(params: CreateTaskParams) -> Task {
    let now = chrono::Utc::now();
    Task {
        id: uuid_like(&now),
        description: params.description,
        workflow: params.workflow,
        autonomy: params.autonomy,
        priority: params.priority,
        project_path: params.project_path,
        status: TaskStatus::Queued,
        current_stage: None,
        pause_reason: None,
        resume_attempts: 0,
        max_resume_attempts: 3,
        retry_count: 0,
        max_retries: 3,
        parent_task_id: params.parent_task_id,
        subtask_ids: vec![],
        subtask_strategy: params.subtask_strategy,
        depends_on: params.depends_on,
        blocked_by: vec![],
        estimated_cost: params.estimated_cost,
        estimated_tokens: params.estimated_tokens,
        usage: taskd_core::types::TaskUsage::default(),
        workspace: params.workspace,
        created_at: now,
        updated_at: now,
        paused_at: None,
        failure_reason: None,
    }
}

fn uuid_like(now: &chrono::DateTime<chrono::Utc>) -> String {
    format!("task-{}", now.timestamp_nanos_opt().unwrap_or_default())
}

fn ok_response(id: Option<u64>, result: serde_json::Value) -> JsonRpcResponse {
    JsonRpcResponse { jsonrpc: "2.0".into(), id, result: Some(result), error: None }
}

fn error_response(id: Option<u64>, code: i32, message: String) -> JsonRpcResponse {
    JsonRpcResponse { jsonrpc: "2.0".into(), id, result: None, error: Some(JsonRpcError { code, message }) }
}

async fn write_json<T: serde::Serialize>(writer: &mut tokio::net::unix::OwnedWriteHalf, value: &T) -> std::io::Result<()> {
    let mut buf = serde_json::to_vec(value).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await
}

async fn cleanup_socket(path: &Path) {
    if path.exists() {
        tracing::info!(path = %path.display(), "removing stale socket");
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(error = %e, path = %path.display(), "failed to remove stale socket");
        }
    }
}
