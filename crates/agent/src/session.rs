// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task session driver: the multi-turn loop that owns the dialogue
//! with the model.
//!
//! The driver runs until the task completes, fails hard, or is cancelled.
//! It recovers from transient model errors with exponential backoff,
//! resets a broken resume session after two consecutive failures, and
//! suspends on user input through the interaction stream — never by
//! polling.

use crate::control::ControlPlane;
use crate::hooks::{parse_hooks, run_hooks};
use crate::model::{parse_sub_agents, TurnOptions, TurnRunner};
use crate::permissions::{PermissionCache, SessionPermissions};
use crate::waiter::{InteractionWaiter, WaitOutcome};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use toil_core::{
    parse_next_status, parse_task_description, strip_task_description, task::meta, HookTrigger,
    InteractionKind, PermissionMode, StatusId, StatusTransition, TaskId,
};
use toil_wire::{
    AgentStatus, CreateInteractionRequest, ReportAgentStatusRequest, ReportTaskResultRequest,
    TaskResultStatus,
};

/// First retry delay after a failed turn.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
/// Retry delay ceiling.
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);
/// Hard cap: the task fails after this many consecutive turn errors.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;
/// A resumed session is discarded after this many consecutive errors.
const SESSION_RESET_AT: u32 = 2;

/// How a driver run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Completed,
    Failed,
    Cancelled,
}

pub struct SessionDriver {
    pub task_id: TaskId,
    pub worker_id: String,
    /// Agent system prompt from the claim response.
    pub instructions: Option<String>,
    /// Enriched task metadata from the claim response.
    pub metadata: HashMap<String, String>,
    /// Checkout the session works in when the task uses a worktree.
    pub worktree: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub control: Arc<dyn ControlPlane>,
    pub model: Arc<dyn TurnRunner>,
    pub waiter: Arc<InteractionWaiter>,
    pub cache: Arc<PermissionCache>,
    pub cancel: CancellationToken,
}

impl SessionDriver {
    /// Drive the task to an exit. `after_task_execution` hooks run exactly
    /// once, on every exit path.
    pub async fn run(self) {
        let hooks = parse_hooks(&self.metadata);
        let cwd = self.session_cwd();

        let _ = self
            .control
            .report_agent_status(ReportAgentStatusRequest {
                worker_id: self.worker_id.clone(),
                task_id: self.task_id,
                status: AgentStatus::Running,
                message: None,
            })
            .await;

        run_hooks(
            &hooks,
            HookTrigger::BeforeTaskExecution,
            self.task_id,
            self.model.as_ref(),
            self.control.as_ref(),
            Some(&cwd),
        )
        .await;

        let mut after_hooks_fired = false;
        let exit = self.turn_loop(&hooks, &cwd, &mut after_hooks_fired).await;

        // Deferred guarantee: the after hooks run even when the loop bailed
        // out before its own completion path fired them.
        if !after_hooks_fired {
            run_hooks(
                &hooks,
                HookTrigger::AfterTaskExecution,
                self.task_id,
                self.model.as_ref(),
                self.control.as_ref(),
                Some(&cwd),
            )
            .await;
        }

        let final_status = match exit {
            Exit::Failed => AgentStatus::Error,
            Exit::Completed | Exit::Cancelled => AgentStatus::Idle,
        };
        let _ = self
            .control
            .report_agent_status(ReportAgentStatusRequest {
                worker_id: self.worker_id.clone(),
                task_id: self.task_id,
                status: final_status,
                message: None,
            })
            .await;
        tracing::info!(task = %self.task_id, ?exit, "session driver finished");
    }

    fn session_cwd(&self) -> PathBuf {
        self.worktree.clone().unwrap_or_else(|| self.work_dir.clone())
    }

    fn permission_mode(&self) -> PermissionMode {
        self.metadata
            .get(meta::PERMISSION_MODE)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    fn available_transitions(&self) -> Vec<StatusTransition> {
        self.metadata
            .get(meta::AVAILABLE_TRANSITIONS)
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    fn initial_prompt(&self) -> String {
        let title = self
            .metadata
            .get(meta::TASK_TITLE)
            .map(String::as_str)
            .unwrap_or("Untitled task");
        let description = self
            .metadata
            .get(meta::TASK_DESCRIPTION)
            .map(String::as_str)
            .unwrap_or("");
        if description.is_empty() {
            title.to_string()
        } else {
            format!("{}\n\n{}", title, description)
        }
    }

    async fn report_result(&self, status: TaskResultStatus, summary: String, error: Option<String>) {
        let request = ReportTaskResultRequest {
            task_id: self.task_id,
            worker_id: self.worker_id.clone(),
            status,
            summary,
            error,
        };
        if let Err(e) = self.control.report_task_result(request).await {
            tracing::warn!(task = %self.task_id, error = %e, "result report failed");
        }
    }

    async fn run_after_hooks(&self, hooks: &[toil_core::Hook], cwd: &Path, fired: &mut bool) {
        if *fired {
            return;
        }
        run_hooks(
            hooks,
            HookTrigger::AfterTaskExecution,
            self.task_id,
            self.model.as_ref(),
            self.control.as_ref(),
            Some(cwd),
        )
        .await;
        *fired = true;
    }

    async fn turn_loop(
        &self,
        hooks: &[toil_core::Hook],
        cwd: &Path,
        after_hooks_fired: &mut bool,
    ) -> Exit {
        let mut session_id = self
            .metadata
            .get(meta::SESSION_ID)
            .cloned()
            .filter(|s| !s.is_empty());
        let mut prompt = self.initial_prompt();
        let mut consecutive_errors = 0u32;
        let mut backoff = INITIAL_BACKOFF;
        let mut worktree_hook_fired = false;

        let transitions = self.available_transitions();
        let sub_agents = parse_sub_agents(&self.metadata);
        let permission_mode = self.permission_mode();
        let permissions = Arc::new(SessionPermissions {
            task_id: self.task_id,
            agent_id: self.worker_id.clone(),
            mode: permission_mode,
            cache: Arc::clone(&self.cache),
            control: Arc::clone(&self.control),
            waiter: Arc::clone(&self.waiter),
            cancel: self.cancel.clone(),
        });

        loop {
            let options = TurnOptions {
                system_prompt: self.instructions.clone(),
                cwd: Some(cwd.to_path_buf()),
                permission_mode,
                resume: session_id.clone(),
                sub_agents: sub_agents.clone(),
                max_turns: None,
            };

            let turn = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.report_result(TaskResultStatus::Cancelled, String::new(), None).await;
                    return Exit::Cancelled;
                }
                result = self.model.run_turn(&prompt, &options, permissions.clone()) => result,
            };

            let outcome = match turn {
                Ok(outcome) => outcome,
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::warn!(
                        task = %self.task_id,
                        attempt = consecutive_errors,
                        error = %e,
                        "turn failed"
                    );

                    // A broken resume handle is the usual cause of repeated
                    // immediate failures: drop it once and start fresh.
                    if session_id.is_some() && consecutive_errors == SESSION_RESET_AT {
                        tracing::info!(task = %self.task_id, "discarding session, starting fresh");
                        session_id = None;
                        backoff = INITIAL_BACKOFF;
                        continue;
                    }

                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        self.report_result(
                            TaskResultStatus::Failed,
                            String::new(),
                            Some(e.to_string()),
                        )
                        .await;
                        return Exit::Failed;
                    }

                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            self.report_result(TaskResultStatus::Cancelled, String::new(), None)
                                .await;
                            return Exit::Cancelled;
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            consecutive_errors = 0;
            backoff = INITIAL_BACKOFF;

            if let Some(new_session) = &outcome.session_id {
                if session_id.as_deref() != Some(new_session.as_str()) {
                    let update = HashMap::from([(
                        meta::SESSION_ID.to_string(),
                        new_session.clone(),
                    )]);
                    if let Err(e) =
                        self.control.update_task_metadata(self.task_id, update).await
                    {
                        tracing::warn!(task = %self.task_id, error = %e, "session-id persist failed");
                    }
                }
                session_id = Some(new_session.clone());
            }

            if let Some(description) = parse_task_description(&outcome.text) {
                if let Err(e) =
                    self.control.update_task_description(self.task_id, description).await
                {
                    tracing::warn!(task = %self.task_id, error = %e, "description update failed");
                }
            }

            if self.worktree.is_some() && !worktree_hook_fired {
                run_hooks(
                    hooks,
                    HookTrigger::AfterWorktreeCreation,
                    self.task_id,
                    self.model.as_ref(),
                    self.control.as_ref(),
                    Some(cwd),
                )
                .await;
                worktree_hook_fired = true;
            }

            let summary = strip_task_description(&outcome.text).trim().to_string();
            let next_status = parse_next_status(&outcome.text);

            // Completion decision: an explicit directive finishes the task;
            // so does a status with exactly one way out. A status with no
            // way out just finishes. Anything else means the model needs
            // the user.
            let chosen: Option<StatusId> = match next_status {
                Some(id) => Some(StatusId::from(id)),
                None if transitions.len() == 1 => Some(transitions[0].id.clone()),
                None => None,
            };

            if let Some(target) = chosen {
                self.report_result(TaskResultStatus::Completed, summary, None).await;
                self.run_after_hooks(hooks, cwd, after_hooks_fired).await;

                if transitions.iter().any(|t| t.id == target) {
                    if let Err(e) = self.control.update_task_status(self.task_id, target.clone()).await
                    {
                        tracing::warn!(
                            task = %self.task_id,
                            status = %target,
                            error = %e,
                            "status transition failed"
                        );
                    }
                } else {
                    tracing::warn!(
                        task = %self.task_id,
                        status = %target,
                        "chosen status is not an allowed transition, skipping"
                    );
                }
                return Exit::Completed;
            }

            if transitions.is_empty() {
                self.report_result(TaskResultStatus::Completed, summary, None).await;
                self.run_after_hooks(hooks, cwd, after_hooks_fired).await;
                return Exit::Completed;
            }

            // The model stopped without a directive and more than one road
            // leads out: ask the user how to continue.
            let created = self
                .control
                .create_interaction(CreateInteractionRequest {
                    task_id: self.task_id,
                    agent_id: self.worker_id.clone(),
                    kind: InteractionKind::Question,
                    title: self
                        .metadata
                        .get(meta::TASK_TITLE)
                        .cloned()
                        .unwrap_or_else(|| "Task needs input".to_string()),
                    description: summary.clone(),
                    options: Vec::new(),
                })
                .await;
            let created = match created {
                Ok(created) => created,
                Err(e) => {
                    // Treat like a transient turn failure; the next loop
                    // iteration re-runs the same prompt.
                    consecutive_errors += 1;
                    tracing::warn!(task = %self.task_id, error = %e, "question create failed");
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        self.report_result(
                            TaskResultStatus::Failed,
                            String::new(),
                            Some(e.to_string()),
                        )
                        .await;
                        return Exit::Failed;
                    }
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            self.report_result(TaskResultStatus::Cancelled, String::new(), None)
                                .await;
                            return Exit::Cancelled;
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            match self.waiter.wait(created.id, &self.cancel).await {
                WaitOutcome::Responded(interaction) => {
                    prompt = interaction.response.unwrap_or_default();
                }
                WaitOutcome::Expired(_) => {
                    // Nobody is coming; close the task out with what we have.
                    self.report_result(TaskResultStatus::Completed, summary, None).await;
                    self.run_after_hooks(hooks, cwd, after_hooks_fired).await;
                    return Exit::Completed;
                }
                WaitOutcome::Cancelled => {
                    self.report_result(TaskResultStatus::Cancelled, String::new(), None).await;
                    return Exit::Cancelled;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
