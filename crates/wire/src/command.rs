// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server→worker commands pushed over the agent stream.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use toil_core::{AgentDefId, TaskId};

/// Commands delivered to an attached agent manager.
///
/// Serializes with `{"type": "command:name", ...fields}` format. Receivers
/// must switch exhaustively; unknown types are a protocol error rather than
/// a silent skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentCommand {
    /// A task is available for claiming. Broadcast to the task's project.
    #[serde(rename = "task:available")]
    TaskAvailable {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_config_id: Option<AgentDefId>,
        title: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        metadata: HashMap<String, String>,
    },

    /// Direct assignment: run without claiming.
    #[serde(rename = "task:assign")]
    AssignTask {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_config_id: Option<AgentDefId>,
        title: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        metadata: HashMap<String, String>,
    },

    /// Cancel a running task session.
    #[serde(rename = "task:cancel")]
    CancelTask {
        task_id: TaskId,
        #[serde(default)]
        reason: String,
    },

    /// Report the worker's git worktrees.
    #[serde(rename = "worktree:list")]
    ListWorktrees,

    /// Delete one worktree by name.
    #[serde(rename = "worktree:delete")]
    DeleteWorktree { worktree_name: String },

    /// Pull the default branch in the main checkout.
    #[serde(rename = "git:pull_main")]
    GitPullMain,

    /// Re-sync agent definition files.
    #[serde(rename = "sync:agents")]
    SyncAgents,

    /// Re-sync the permission rule set.
    #[serde(rename = "sync:permissions")]
    SyncPermissions,

    /// Re-sync script files.
    #[serde(rename = "sync:scripts")]
    SyncScripts,

    /// Execute a synced script; output is streamed back in chunks.
    #[serde(rename = "script:execute")]
    ExecuteScript {
        execution_id: String,
        script_name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
}

impl AgentCommand {
    /// The task this command targets, when any.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            AgentCommand::TaskAvailable { task_id, .. }
            | AgentCommand::AssignTask { task_id, .. }
            | AgentCommand::CancelTask { task_id, .. } => Some(*task_id),
            _ => None,
        }
    }

    /// Commands safe to drop when a worker's outbound buffer is full.
    ///
    /// Task offers are re-issued by the orchestrator on the next status
    /// event; cancellations and syncs must not be lost silently, so only
    /// offers are droppable.
    pub fn is_droppable(&self) -> bool {
        matches!(self, AgentCommand::TaskAvailable { .. })
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
