// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle events fanned out by the control plane.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for a published event.
    pub struct EventId("evnt-");
}

/// Metadata keys carried on task-originated events.
pub mod meta_keys {
    pub const PROJECT_ID: &str = "project_id";
    pub const WORKFLOW_ID: &str = "workflow_id";
    pub const TASK_ID: &str = "task_id";
    pub const NEW_STATUS_ID: &str = "new_status_id";
    pub const RESULT_STATUS: &str = "result_status";
    pub const WORKER_ID: &str = "worker_id";
    pub const INTERACTION_ID: &str = "interaction_id";
}

/// Kind tags for every event on the bus.
///
/// Serializes as `"task:created"`-style strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "task:created")]
    TaskCreated,
    #[serde(rename = "task:updated")]
    TaskUpdated,
    #[serde(rename = "task:deleted")]
    TaskDeleted,
    #[serde(rename = "task:status_changed")]
    TaskStatusChanged,
    #[serde(rename = "task:log_appended")]
    TaskLogAppended,
    #[serde(rename = "interaction:created")]
    InteractionCreated,
    #[serde(rename = "interaction:responded")]
    InteractionResponded,
    #[serde(rename = "agent:status_changed")]
    AgentStatusChanged,
    #[serde(rename = "agent:assigned")]
    AgentAssigned,
    #[serde(rename = "permission:changed")]
    PermissionChanged,
}

/// A single published event.
///
/// Subscribers filter by [`EventKind`] and the `project_id` metadata key;
/// the payload is opaque to the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub kind: EventKind,
    /// ID of the entity the event is about (task, interaction, …).
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    pub created_at_ms: u64,
}

impl Event {
    pub fn new(kind: EventKind, resource_id: impl Into<String>, created_at_ms: u64) -> Self {
        Self {
            id: EventId::new(),
            kind,
            resource_id: resource_id.into(),
            payload: None,
            metadata: HashMap::new(),
            created_at_ms,
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn project_id(&self) -> Option<&str> {
        self.meta(meta_keys::PROJECT_ID)
    }

    pub fn task_id(&self) -> Option<&str> {
        self.meta(meta_keys::TASK_ID)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
