// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interaction ledger records: questions, permission prompts, and
//! notifications surfaced to humans.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for an interaction.
    pub struct InteractionId("intr-");
}

/// What kind of user-facing record this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    PermissionRequest,
    Question,
    Notification,
    UserMessage,
}

/// Interaction lifecycle. Transitions are append-once:
/// Pending → Responded, or Pending → Expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Pending,
    Responded,
    Expired,
}

impl InteractionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, InteractionStatus::Pending)
    }
}

impl fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InteractionStatus::Pending => "pending",
            InteractionStatus::Responded => "responded",
            InteractionStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// One selectable option on an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionOption {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl InteractionOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { label: label.into(), value: value.into(), description: None }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

/// A ledger record mediating a human decision for a running task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub task_id: TaskId,
    /// Worker-side agent that raised the interaction.
    #[serde(default)]
    pub agent_id: String,
    pub kind: InteractionKind,
    pub status: InteractionStatus,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<InteractionOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at_ms: Option<u64>,
}

impl Interaction {
    pub fn new(
        task_id: TaskId,
        agent_id: impl Into<String>,
        kind: InteractionKind,
        title: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id: InteractionId::new(),
            task_id,
            agent_id: agent_id.into(),
            kind,
            status: InteractionStatus::Pending,
            title: title.into(),
            description: String::new(),
            options: Vec::new(),
            response: None,
            created_at_ms: now_ms,
            responded_at_ms: None,
        }
    }

    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn with_options(mut self, options: Vec<InteractionOption>) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
#[path = "interaction_tests.rs"]
mod tests;
