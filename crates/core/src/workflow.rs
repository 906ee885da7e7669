// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow definitions: ordered statuses, the transition graph, and the
//! agent/hook bindings that drive dispatch.

use crate::sync::{AgentDefId, SkillDefId};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

crate::define_id! {
    /// Unique identifier for a workflow.
    pub struct WorkflowId("wflw-");
}

/// Identifier of a status within a workflow.
///
/// Status ids are author-chosen (e.g. `"draft"`, `"review"`), not
/// generated, so this is a plain string newtype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusId(pub String);

impl StatusId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StatusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StatusId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StatusId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for StatusId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StatusId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for StatusId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Trigger points a hook can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookTrigger {
    BeforeTaskExecution,
    AfterTaskExecution,
    AfterWorktreeCreation,
}

/// A skill invocation bound to a workflow status.
///
/// The `name` and `content` fields are enriched from the skill record when
/// the hook list is serialized into task metadata, so workers need no
/// skill lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    pub id: String,
    pub skill_id: SkillDefId,
    pub trigger: HookTrigger,
    pub order: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
}

/// One status in a workflow's ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: StatusId,
    pub name: String,
    pub order: u32,
    #[serde(default)]
    pub is_initial: bool,
    #[serde(default)]
    pub is_terminal: bool,
    /// Status ids this status may transition to. Empty for terminal statuses.
    #[serde(default)]
    pub transitions: Vec<StatusId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentDefId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<Hook>,
}

impl Status {
    pub fn allows_transition_to(&self, target: &StatusId) -> bool {
        self.transitions.contains(target)
    }
}

/// Legacy per-status agent binding, kept for workflows created before
/// statuses carried `agent_id` directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub workflow_status_id: StatusId,
    pub agent_id: AgentDefId,
}

/// A `{id, name}` pair used when serializing available transitions into
/// task metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub id: StatusId,
    pub name: String,
}

/// A workflow: the status graph one project's tasks move through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub project_id: crate::ProjectId,
    pub name: String,
    pub statuses: Vec<Status>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_configs: Vec<AgentConfig>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Workflow {
    /// The unique initial status.
    pub fn initial_status(&self) -> Option<&Status> {
        self.statuses.iter().find(|s| s.is_initial)
    }

    /// Look up a status by id.
    pub fn status(&self, id: &StatusId) -> Option<&Status> {
        self.statuses.iter().find(|s| &s.id == id)
    }

    pub fn has_status(&self, id: &StatusId) -> bool {
        self.status(id).is_some()
    }

    /// Resolve the agent bound to a status.
    ///
    /// Lookup order: the status's own `agent_id`, then the legacy
    /// `agent_configs` list keyed by status id. `None` means the status is
    /// terminal or manual and the orchestrator leaves the task alone.
    pub fn agent_for_status(&self, status_id: &StatusId) -> Option<AgentDefId> {
        if let Some(status) = self.status(status_id) {
            if let Some(agent_id) = status.agent_id {
                return Some(agent_id);
            }
        }
        self.agent_configs
            .iter()
            .find(|c| &c.workflow_status_id == status_id)
            .map(|c| c.agent_id)
    }

    /// The `{id, name}` pairs of every transition allowed out of a status.
    pub fn transitions_from(&self, status_id: &StatusId) -> Vec<StatusTransition> {
        let Some(status) = self.status(status_id) else {
            return Vec::new();
        };
        status
            .transitions
            .iter()
            .filter_map(|target| {
                self.status(target).map(|s| StatusTransition {
                    id: s.id.clone(),
                    name: s.name.clone(),
                })
            })
            .collect()
    }

    /// Structural validation: exactly one initial status, terminal statuses
    /// have no outgoing transitions, every transition target exists.
    pub fn validate(&self) -> Result<(), crate::Error> {
        let initial_count = self.statuses.iter().filter(|s| s.is_initial).count();
        if initial_count != 1 {
            return Err(crate::Error::invalid_argument(format!(
                "workflow must have exactly one initial status, found {}",
                initial_count
            )));
        }
        for status in &self.statuses {
            if status.is_terminal && !status.transitions.is_empty() {
                return Err(crate::Error::invalid_argument(format!(
                    "terminal status '{}' must not have outgoing transitions",
                    status.id
                )));
            }
            for target in &status.transitions {
                if !self.has_status(target) {
                    return Err(crate::Error::invalid_argument(format!(
                        "status '{}' transitions to unknown status '{}'",
                        status.id, target
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
