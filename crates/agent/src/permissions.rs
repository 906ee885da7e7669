// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-side permission policy: the project allow-rule cache and the
//! per-session resolver that answers tool-use requests.

use crate::control::ControlPlane;
use crate::model::{PermissionDecision, PermissionHandler, ToolUseRequest};
use crate::waiter::{InteractionWaiter, WaitOutcome};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toil_core::{
    format_rule, glob_match, parse_rule, union_dedup, InteractionKind, InteractionOption,
    PermissionMode, TaskId,
};
use toil_wire::{CreateInteractionRequest, SyncPermissionsRequest};

/// Tools that never mutate anything and are always allowed.
const READ_ONLY_TOOLS: &[&str] = &["Read", "Glob", "Grep", "WebSearch", "WebFetch"];

/// Tools allowed automatically under `acceptEdits`.
const EDIT_TOOLS: &[&str] = &["Edit", "Write", "NotebookEdit"];

/// Input fields matched against non-Bash rule patterns, in priority order.
const PATTERN_FIELDS: &[&str] = &["file_path", "pattern", "path", "query", "url"];

/// In-memory authoritative allow rules for one project.
pub struct PermissionCache {
    project_name: String,
    allow: RwLock<Vec<String>>,
}

impl PermissionCache {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self { project_name: project_name.into(), allow: RwLock::new(Vec::new()) }
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Replace the cache wholesale (initial sync and server responses).
    pub fn replace_all(&self, rules: Vec<String>) {
        *self.allow.write() = rules;
    }

    pub fn rules(&self) -> Vec<String> {
        self.allow.read().clone()
    }

    /// True if any cached rule allows this tool invocation.
    pub fn check(&self, tool: &str, input: &serde_json::Value) -> bool {
        let rules = self.allow.read();
        rules.iter().any(|rule| rule_matches(rule, tool, input))
    }

    /// Optimistically merge new rules locally, then sync with the server
    /// and replace the cache with its authoritative answer.
    ///
    /// The local union and the post-response replacement each take the
    /// write lock once; the server call runs without holding it.
    pub async fn add_and_sync(
        &self,
        new_rules: Vec<String>,
        control: &dyn ControlPlane,
    ) -> Result<(), toil_core::Error> {
        {
            let mut allow = self.allow.write();
            *allow = union_dedup(&allow, &new_rules);
        }
        let response = control
            .sync_permissions(SyncPermissionsRequest {
                project_name: self.project_name.clone(),
                local_allow: new_rules,
            })
            .await?;
        {
            let mut allow = self.allow.write();
            *allow = response.allow;
        }
        Ok(())
    }
}

/// Match one rule string against a tool invocation.
fn rule_matches(rule: &str, tool: &str, input: &serde_json::Value) -> bool {
    let (rule_tool, pattern, has_pattern) = parse_rule(rule);
    if rule_tool != tool {
        return false;
    }
    if !has_pattern {
        return true;
    }
    if tool == "Bash" {
        return input
            .get("command")
            .and_then(|v| v.as_str())
            .is_some_and(|command| glob_match(pattern, command));
    }
    for field in PATTERN_FIELDS {
        if let Some(value) = input.get(field).and_then(|v| v.as_str()) {
            return glob_match(pattern, value);
        }
    }
    false
}

/// Per-session permission resolver installed as the turn's
/// [`PermissionHandler`].
pub struct SessionPermissions {
    pub task_id: TaskId,
    pub agent_id: String,
    pub mode: PermissionMode,
    pub cache: Arc<PermissionCache>,
    pub control: Arc<dyn ControlPlane>,
    pub waiter: Arc<InteractionWaiter>,
    pub cancel: CancellationToken,
}

impl SessionPermissions {
    /// Rules to persist for an "always allow" answer: prefer CLI-supplied
    /// suggestions, else `Bash(command)` for Bash, else the bare tool.
    fn always_allow_rules(request: &ToolUseRequest) -> Vec<String> {
        if !request.suggestions.is_empty() {
            return request.suggestions.clone();
        }
        if request.tool == "Bash" {
            if let Some(command) = request.input.get("command").and_then(|v| v.as_str()) {
                return vec![format_rule(&request.tool, command)];
            }
        }
        vec![request.tool.clone()]
    }

    /// Markdown block describing the call in the permission prompt.
    fn describe(request: &ToolUseRequest) -> String {
        let input = serde_json::to_string_pretty(&request.input)
            .unwrap_or_else(|_| request.input.to_string());
        format!("Tool: `{}`\n\n```json\n{}\n```", request.tool, input)
    }

    async fn ask_questions(&self, request: &ToolUseRequest) -> PermissionDecision {
        let questions: Vec<serde_json::Value> = request
            .input
            .get("questions")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut answers = serde_json::Map::new();
        for question in &questions {
            let text = question
                .get("question")
                .and_then(|v| v.as_str())
                .unwrap_or("Question")
                .to_string();
            let mut options: Vec<InteractionOption> = question
                .get("options")
                .and_then(|v| v.as_array())
                .map(|raw_options| {
                    raw_options
                        .iter()
                        .filter_map(|option| {
                            let label = option
                                .as_str()
                                .or_else(|| option.get("label").and_then(|l| l.as_str()))?;
                            Some(InteractionOption::new(label, label))
                        })
                        .collect()
                })
                .unwrap_or_default();
            options.push(
                InteractionOption::new("Other", "__other__")
                    .description("Write a custom response"),
            );

            let created = self
                .control
                .create_interaction(CreateInteractionRequest {
                    task_id: self.task_id,
                    agent_id: self.agent_id.clone(),
                    kind: InteractionKind::Question,
                    title: text.clone(),
                    description: question
                        .get("header")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    options,
                })
                .await;
            let created = match created {
                Ok(created) => created,
                Err(e) => {
                    tracing::warn!(error = %e, "question interaction failed, denying");
                    return PermissionDecision::Deny { reason: "question delivery failed".into() };
                }
            };

            match self.waiter.wait(created.id, &self.cancel).await {
                WaitOutcome::Responded(interaction) => {
                    answers.insert(
                        text,
                        serde_json::Value::String(interaction.response.unwrap_or_default()),
                    );
                }
                WaitOutcome::Expired(_) | WaitOutcome::Cancelled => {
                    return PermissionDecision::Deny { reason: "question unanswered".into() };
                }
            }
        }

        let mut input = request.input.clone();
        if let Some(object) = input.as_object_mut() {
            object.insert("answers".to_string(), serde_json::Value::Object(answers));
        }
        PermissionDecision::AllowWithInput(input)
    }
}

#[async_trait]
impl PermissionHandler for SessionPermissions {
    async fn resolve(&self, request: ToolUseRequest) -> PermissionDecision {
        if self.mode == PermissionMode::Bypass {
            return PermissionDecision::Allow;
        }
        if READ_ONLY_TOOLS.contains(&request.tool.as_str()) {
            return PermissionDecision::Allow;
        }
        if self.mode == PermissionMode::AcceptEdits && EDIT_TOOLS.contains(&request.tool.as_str())
        {
            return PermissionDecision::Allow;
        }
        if request.tool == "AskUserQuestion" {
            return self.ask_questions(&request).await;
        }
        if self.cache.check(&request.tool, &request.input) {
            return PermissionDecision::Allow;
        }

        let created = self
            .control
            .create_interaction(CreateInteractionRequest {
                task_id: self.task_id,
                agent_id: self.agent_id.clone(),
                kind: InteractionKind::PermissionRequest,
                title: format!("Allow {}?", request.tool),
                description: Self::describe(&request),
                options: vec![
                    InteractionOption::new("Allow", "allow"),
                    InteractionOption::new("Always Allow", "always_allow")
                        .description("Persist a rule for this project"),
                    InteractionOption::new("Deny", "deny"),
                ],
            })
            .await;
        let created = match created {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!(error = %e, "permission interaction failed, denying");
                return PermissionDecision::Deny { reason: "permission prompt failed".into() };
            }
        };

        match self.waiter.wait(created.id, &self.cancel).await {
            WaitOutcome::Responded(interaction) => {
                match interaction.response.as_deref() {
                    Some("allow") => PermissionDecision::Allow,
                    Some("always_allow") => {
                        let rules = Self::always_allow_rules(&request);
                        if let Err(e) =
                            self.cache.add_and_sync(rules, self.control.as_ref()).await
                        {
                            tracing::warn!(error = %e, "always-allow sync failed");
                        }
                        PermissionDecision::Allow
                    }
                    _ => PermissionDecision::Deny { reason: "denied by user".into() },
                }
            }
            WaitOutcome::Expired(_) => {
                PermissionDecision::Deny { reason: "permission request expired".into() }
            }
            WaitOutcome::Cancelled => {
                PermissionDecision::Deny { reason: "task cancelled".into() }
            }
        }
    }
}

#[cfg(test)]
#[path = "permissions_tests.rs"]
mod tests;
