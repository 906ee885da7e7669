// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project entity.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a project.
    pub struct ProjectId("proj-");
}

/// A project groups workflows and tasks and routes commands to workers.
///
/// The project *name* (not the id) is the routing key: workers register
/// with a project name and receive only that project's offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub repository_url: String,
    #[serde(default)]
    pub default_branch: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Project {
    pub fn new(name: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id: ProjectId::new(),
            name: name.into(),
            repository_url: String::new(),
            default_branch: "main".to_string(),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
}
