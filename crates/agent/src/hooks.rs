// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow-hook execution on the worker.
//!
//! Hooks arrive JSON-encoded in task metadata. Each one is a short,
//! bypass-permissions, turn-capped model call; its output may carry
//! `TASK_METADATA: key=value` lines that are applied back to the task.
//! A failing hook is logged and skipped — hooks never fail the task.

use crate::control::ControlPlane;
use crate::model::{PermissionDecision, PermissionHandler, ToolUseRequest, TurnOptions, TurnRunner};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use toil_core::{parse_task_metadata, task::meta, Hook, HookTrigger, PermissionMode, TaskId};

/// Turn cap for hook invocations.
const HOOK_MAX_TURNS: u32 = 5;

/// Hooks run with every tool allowed; they are operator-authored.
struct BypassPermissions;

#[async_trait]
impl PermissionHandler for BypassPermissions {
    async fn resolve(&self, _request: ToolUseRequest) -> PermissionDecision {
        PermissionDecision::Allow
    }
}

/// Decode the `_hooks` metadata value. Malformed JSON yields no hooks.
pub fn parse_hooks(metadata: &HashMap<String, String>) -> Vec<Hook> {
    metadata
        .get(meta::HOOKS)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}

/// Run every hook bound to `trigger`, in ordinal order.
///
/// Collected `TASK_METADATA` pairs are applied through the control plane
/// after each hook.
pub async fn run_hooks(
    hooks: &[Hook],
    trigger: HookTrigger,
    task_id: TaskId,
    model: &dyn TurnRunner,
    control: &dyn ControlPlane,
    cwd: Option<&Path>,
) {
    let mut selected: Vec<&Hook> = hooks.iter().filter(|h| h.trigger == trigger).collect();
    selected.sort_by_key(|h| h.order);

    for hook in selected {
        tracing::info!(task = %task_id, hook = %hook.name, ?trigger, "running hook");
        let options = TurnOptions {
            system_prompt: None,
            cwd: cwd.map(Path::to_path_buf),
            permission_mode: PermissionMode::Bypass,
            resume: None,
            sub_agents: Vec::new(),
            max_turns: Some(HOOK_MAX_TURNS),
        };
        let outcome = model
            .run_turn(&hook.content, &options, Arc::new(BypassPermissions))
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(task = %task_id, hook = %hook.name, error = %e, "hook failed");
                continue;
            }
        };

        let metadata = parse_task_metadata(&outcome.text);
        if metadata.is_empty() {
            continue;
        }
        if let Err(e) = control.update_task_metadata(task_id, metadata).await {
            tracing::warn!(
                task = %task_id,
                hook = %hook.name,
                error = %e,
                "hook metadata update failed"
            );
        }
    }
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
