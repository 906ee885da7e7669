// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DTO structs for the unary RPC surface.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use toil_core::{
    Interaction, InteractionId, InteractionKind, InteractionOption, LogLevel, PermissionMode,
    ProjectId, StatusId, TaskId, WorkflowId,
};

/// Error payload returned with non-2xx statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: toil_core::Code,
    pub message: String,
}

/// Minimal acknowledgement body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn yes() -> Self {
        Self { ok: true }
    }
}

/// Query parameters for opening the agent command stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeParams {
    pub worker_id: String,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
    #[serde(default)]
    pub project_name: String,
}

fn default_max_concurrent() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub worker_id: String,
    pub active_count: u32,
}

/// `ok=false` tells the worker its registration is gone and it should
/// re-subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimTaskRequest {
    pub task_id: TaskId,
    pub worker_id: String,
}

/// Claim outcome. On `success`, `instructions` carries the agent system
/// prompt and `metadata` the enriched task metadata for the session driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimTaskResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ClaimTaskResponse {
    pub fn lost() -> Self {
        Self { success: false, instructions: None, metadata: HashMap::new() }
    }
}

/// Terminal outcome of one session-driver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResultStatus {
    Completed,
    Failed,
    Cancelled,
}

impl TaskResultStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskResultStatus::Completed => "completed",
            TaskResultStatus::Failed => "failed",
            TaskResultStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTaskResultRequest {
    pub task_id: TaskId,
    pub worker_id: String,
    pub status: TaskResultStatus,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Worker-side agent state fanned out as `agent:status_changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Running,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportAgentStatusRequest {
    pub worker_id: String,
    pub task_id: TaskId,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportScriptOutputChunkRequest {
    pub execution_id: String,
    pub stream: OutputStream,
    pub seq: u32,
    pub chunk: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportScriptExecutionResultRequest {
    pub execution_id: String,
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorktreeInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportWorktreeListRequest {
    pub worker_id: String,
    pub worktrees: Vec<WorktreeInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportWorktreeDeleteResultRequest {
    pub worker_id: String,
    pub worktree_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportGitPullMainResultRequest {
    pub worker_id: String,
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A definition file mirrored to the worker's local directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFile {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptFile {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAgentsRequest {
    pub worker_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAgentsResponse {
    pub agents: Vec<AgentFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPermissionsRequest {
    pub project_name: String,
    /// Rules added locally since the last sync; the server union-merges
    /// them into its stored set.
    #[serde(default)]
    pub local_allow: Vec<String>,
}

/// The authoritative rule set after the union-merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPermissionsResponse {
    pub allow: Vec<String>,
    #[serde(default)]
    pub ask: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncScriptsRequest {
    pub worker_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncScriptsResponse {
    pub scripts: Vec<ScriptFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInteractionRequest {
    pub task_id: TaskId,
    #[serde(default)]
    pub agent_id: String,
    pub kind: InteractionKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: Vec<InteractionOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInteractionResponse {
    pub interaction: Interaction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTaskLogRequest {
    pub task_id: TaskId,
    #[serde(default)]
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespondInteractionRequest {
    pub interaction_id: InteractionId,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub project_id: ProjectId,
    pub workflow_id: WorkflowId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_id: Option<StatusId>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub use_worktree: bool,
    #[serde(default)]
    pub permission_mode: PermissionMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub task_id: TaskId,
    pub status_id: StatusId,
    #[serde(default)]
    pub force: bool,
}

/// Merge metadata entries into a task (session-id persistence, hook
/// `TASK_METADATA` output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTaskMetadataRequest {
    pub task_id: TaskId,
    pub metadata: HashMap<String, String>,
}

/// Replace a task's description (driven by the description directive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTaskDescriptionRequest {
    pub task_id: TaskId,
    pub description: String,
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
