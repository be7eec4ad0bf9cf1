//! JSON-RPC wire contract, newline-delimited JSON over a Unix
//! domain socket. Shared between `server` (in this crate) and
//! `taskd-client` so both sides of the protocol are defined once and
//! cannot drift apart.

use serde::{Deserialize, Serialize};
use taskd_core::events::DomainEvent;
use taskd_core::types::{Priority, SubtaskStrategy, Task, TaskStatus, Workspace};

fn default_jsonrpc() -> String {
    "2.0".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// Server-initiated push (no `id`), one per published `DomainEvent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

pub const METHOD_CREATE_TASK: &str = "create_task";
pub const METHOD_STATUS: &str = "status";
pub const METHOD_STOP: &str = "stop";
pub const METHOD_RESUME: &str = "resume";
pub const METHOD_CANCEL: &str = "cancel";
pub const METHOD_TRASH: &str = "trash";
pub const METHOD_RESTORE: &str = "restore";
pub const METHOD_ARCHIVE: &str = "archive";
pub const METHOD_UNARCHIVE: &str = "unarchive";
pub const METHOD_SUBSCRIBE: &str = "subscribe";

pub const ERR_PARSE: i32 = -32700;
pub const ERR_METHOD_NOT_FOUND: i32 = -32601;
pub const ERR_INVALID_PARAMS: i32 = -32602;
pub const ERR_TASK_NOT_FOUND: i32 = -32000;
pub const ERR_TASK_TERMINAL: i32 = -32001;
pub const ERR_INTERNAL: i32 = -32099;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskParams {
    pub description: String,
    pub workflow: Vec<String>,
    pub autonomy: String,
    pub priority: Priority,
    pub project_path: String,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    pub subtask_strategy: SubtaskStrategy,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub workspace: Workspace,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default)]
    pub estimated_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskResult {
    pub task: Task,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatusParams {
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskIdParams {
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreParams {
    pub task_id: String,
    pub previous_status: TaskStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResult {
    pub ok: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SubscribeParams {
    #[serde(default)]
    pub events: Vec<String>,
}

/// Map a `DomainEvent` onto its wire method name and payload.
pub fn event_to_notification(event: &DomainEvent) -> JsonRpcNotification {
    let value = serde_json::to_value(event).unwrap_or(serde_json::Value::Null);
    let method = value
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let params = value.get("data").cloned().unwrap_or(value.clone());
    JsonRpcNotification { jsonrpc: "2.0".into(), method, params }
}
