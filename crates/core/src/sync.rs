// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-authoritative definition records mirrored to worker-local files:
//! agent definitions, skills, and scripts.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for an agent definition.
    pub struct AgentDefId("agnt-");
}

crate::define_id! {
    /// Unique identifier for a skill.
    pub struct SkillDefId("skll-");
}

crate::define_id! {
    /// Unique identifier for a script.
    pub struct ScriptDefId("scrp-");
}

/// An agent definition: the system-prompt material a session runs with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDef {
    pub id: AgentDefId,
    pub name: String,
    pub content: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

/// A skill: reusable prompt content invoked by workflow hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDef {
    pub id: SkillDefId,
    pub name: String,
    pub content: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

/// A shell script executable on demand on a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptDef {
    pub id: ScriptDefId,
    pub name: String,
    pub content: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}
