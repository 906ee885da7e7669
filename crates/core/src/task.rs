// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task entity and its assignment lifecycle.

use crate::permission::PermissionMode;
use crate::project::ProjectId;
use crate::workflow::{StatusId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

crate::define_id! {
    /// Unique identifier for a task.
    pub struct TaskId("task-");
}

/// Identifier of an agent-manager worker.
///
/// Worker ids come from the environment (`AGENT_MANAGER_ID`), so this is a
/// plain string newtype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for WorkerId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for WorkerId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for WorkerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Lifecycle of a task's relationship to a worker.
///
/// Unassigned → Pending (offered) → Assigned (claimed) → Unassigned
/// (result reported).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    #[default]
    Unassigned,
    Pending,
    Assigned,
}

impl AssignmentStatus {
    /// True while an agent may be running the task; forced status moves are
    /// rejected in these states.
    pub fn is_active(self) -> bool {
        matches!(self, AssignmentStatus::Pending | AssignmentStatus::Assigned)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssignmentStatus::Unassigned => "unassigned",
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Assigned => "assigned",
        };
        write!(f, "{}", s)
    }
}

/// Reserved task-metadata keys.
///
/// Keys prefixed with `_` are written by the control plane and read by
/// session drivers; everything else is user data.
pub mod meta {
    /// Opaque model-session handle persisted across turns.
    pub const SESSION_ID: &str = "_session_id";
    pub const TASK_TITLE: &str = "_task_title";
    pub const TASK_DESCRIPTION: &str = "_task_description";
    pub const CURRENT_STATUS_NAME: &str = "_current_status_name";
    /// JSON list of `{id, name}` transition pairs.
    pub const AVAILABLE_TRANSITIONS: &str = "_available_transitions";
    pub const USE_WORKTREE: &str = "_use_worktree";
    pub const PERMISSION_MODE: &str = "_permission_mode";
    /// JSON list of sub-agent definitions.
    pub const SUB_AGENTS: &str = "_sub_agents";
    /// JSON list of hooks for the current status.
    pub const HOOKS: &str = "_hooks";

    // Result metadata stamped by report_task_result.
    pub const RESULT_STATUS: &str = "result_status";
    pub const RESULT_SUMMARY: &str = "result_summary";
    pub const RESULT_ERROR: &str = "result_error";

    /// True if the key is control-plane reserved.
    pub fn is_reserved(key: &str) -> bool {
        key.starts_with('_')
    }
}

/// A unit of work driven through a workflow by AI-agent sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub workflow_id: WorkflowId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status_id: StatusId,
    /// Non-empty iff `assignment_status == Assigned`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker_id: Option<WorkerId>,
    #[serde(default)]
    pub assignment_status: AssignmentStatus,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub use_worktree: bool,
    #[serde(default)]
    pub permission_mode: PermissionMode,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Task {
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Check the assignment invariant: a worker id is present exactly when
    /// the task is Assigned.
    pub fn assignment_consistent(&self) -> bool {
        match self.assignment_status {
            AssignmentStatus::Assigned => self.assigned_worker_id.is_some(),
            _ => self.assigned_worker_id.is_none(),
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
