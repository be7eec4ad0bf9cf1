//! Thin client for the taskd JSON-RPC Unix socket API: connect once,
//! send a newline-delimited JSON request, read one response line back.
//! This client exposes several RPCs, so it carries its own monotonic
//! request id instead of hardcoding `id: 1`.

use std::path::Path;

use serde::de::DeserializeOwned;
use taskd_core::types::{Task, TaskStatus};
use taskd_daemon::rpc::*;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub struct DaemonClient {
    stream: BufReader<UnixStream>,
    next_id: u64,
}

impl DaemonClient {
    pub async fn connect(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self { stream: BufReader::new(stream), next_id: 1 })
    }

    async fn call<P: serde::Serialize, R: DeserializeOwned>(&mut self, method: &str, params: P) -> anyhow::Result<R> {
        let id = self.next_id;
        self.next_id += 1;
        let request = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(id),
            method: method.into(),
            params: serde_json::to_value(params)?,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let writer = self.stream.get_mut();
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;

        let mut response_line = String::new();
        self.stream.read_line(&mut response_line).await?;
        let response: JsonRpcResponse = serde_json::from_str(&response_line)?;
        if let Some(err) = response.error {
            anyhow::bail!("daemon error ({}): {}", err.code, err.message);
        }
        let result = response.result.ok_or_else(|| anyhow::anyhow!("missing result in response"))?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn create_task(&mut self, params: CreateTaskParams) -> anyhow::Result<Task> {
        let result: CreateTaskResult = self.call(METHOD_CREATE_TASK, params).await?;
        Ok(result.task)
    }

    pub async fn status(&mut self, task_id: Option<String>) -> anyhow::Result<Vec<Task>> {
        let result: StatusResult = self.call(METHOD_STATUS, StatusParams { task_id }).await?;
        Ok(result.tasks)
    }

    pub async fn stop(&mut self) -> anyhow::Result<()> {
        let _: OkResult = self.call(METHOD_STOP, serde_json::json!({})).await?;
        Ok(())
    }

    pub async fn resume(&mut self, task_id: impl Into<String>) -> anyhow::Result<()> {
        let _: OkResult = self.call(METHOD_RESUME, TaskIdParams { task_id: task_id.into() }).await?;
        Ok(())
    }

    pub async fn cancel(&mut self, task_id: impl Into<String>) -> anyhow::Result<()> {
        let _: OkResult = self.call(METHOD_CANCEL, TaskIdParams { task_id: task_id.into() }).await?;
        Ok(())
    }

    pub async fn trash(&mut self, task_id: impl Into<String>) -> anyhow::Result<()> {
        let _: OkResult = self.call(METHOD_TRASH, TaskIdParams { task_id: task_id.into() }).await?;
        Ok(())
    }

    pub async fn archive(&mut self, task_id: impl Into<String>) -> anyhow::Result<()> {
        let _: OkResult = self.call(METHOD_ARCHIVE, TaskIdParams { task_id: task_id.into() }).await?;
        Ok(())
    }

    pub async fn unarchive(&mut self, task_id: impl Into<String>) -> anyhow::Result<()> {
        let _: OkResult = self.call(METHOD_UNARCHIVE, TaskIdParams { task_id: task_id.into() }).await?;
        Ok(())
    }

    pub async fn restore(&mut self, task_id: impl Into<String>, previous_status: TaskStatus) -> anyhow::Result<()> {
        let _: OkResult = self.call(METHOD_RESTORE, RestoreParams { task_id: task_id.into(), previous_status }).await?;
        Ok(())
    }
}
