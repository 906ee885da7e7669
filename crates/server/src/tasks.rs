// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task service: creation, the guarded status FSM, claim, and result
//! reporting.
//!
//! `update_task_status` and `claim_task` are serialized per task id through
//! an async lock map, so concurrent claims and status moves observe each
//! other's writes.

use crate::bus::EventBus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use toil_core::event::meta_keys;
use toil_core::{
    task::meta, AssignmentStatus, Clock, Error, Event, EventKind, StatusId, Task, TaskId,
    WorkerId, Workflow,
};
use toil_storage::Stores;
use toil_wire::{
    AgentStatus, ClaimTaskResponse, CreateTaskRequest, ReportAgentStatusRequest,
    ReportTaskResultRequest,
};

pub struct TaskService<C: Clock> {
    stores: Stores,
    bus: EventBus,
    clock: C,
    locks: Mutex<HashMap<TaskId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<C: Clock> TaskService<C> {
    pub fn new(stores: Stores, bus: EventBus, clock: C) -> Self {
        Self { stores, bus, clock, locks: Mutex::new(HashMap::new()) }
    }

    /// Acquire the per-task serialization lock.
    async fn lock_task(&self, task_id: TaskId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(task_id).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))))
        };
        lock.lock_owned().await
    }

    fn task_event(&self, kind: EventKind, task: &Task) -> Event {
        Event::new(kind, task.id.to_string(), self.clock.epoch_ms())
            .with_meta(meta_keys::PROJECT_ID, task.project_id.to_string())
            .with_meta(meta_keys::WORKFLOW_ID, task.workflow_id.to_string())
            .with_meta(meta_keys::TASK_ID, task.id.to_string())
    }

    pub async fn create_task(&self, request: CreateTaskRequest) -> Result<Task, Error> {
        // Both referenced entities must exist before the task does.
        self.stores.projects.get(&request.project_id).await?;
        let workflow = self.stores.workflows.get(&request.workflow_id).await?;

        let status_id = match request.status_id {
            Some(status_id) => {
                if !workflow.has_status(&status_id) {
                    return Err(Error::invalid_argument(format!(
                        "status '{}' does not exist in workflow {}",
                        status_id, workflow.id
                    )));
                }
                status_id
            }
            None => workflow
                .initial_status()
                .map(|s| s.id.clone())
                .ok_or_else(|| {
                    Error::failed_precondition(format!(
                        "workflow {} has no initial status",
                        workflow.id
                    ))
                })?,
        };

        let now = self.clock.epoch_ms();
        let task = Task {
            id: TaskId::new(),
            project_id: request.project_id,
            workflow_id: request.workflow_id,
            title: request.title,
            description: request.description,
            status_id,
            assigned_worker_id: None,
            assignment_status: AssignmentStatus::Unassigned,
            metadata: request.metadata,
            use_worktree: request.use_worktree,
            permission_mode: request.permission_mode,
            created_at_ms: now,
            updated_at_ms: now,
        };
        self.stores.tasks.put(&task).await?;

        tracing::info!(task = %task.id, status = %task.status_id, "task created");
        self.bus.publish(&self.task_event(EventKind::TaskCreated, &task));
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &TaskId) -> Result<Task, Error> {
        self.stores.tasks.get(task_id).await
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, Error> {
        self.stores.tasks.list().await
    }

    /// Merge metadata entries into a task and publish `TaskUpdated`.
    pub async fn update_task_metadata(
        &self,
        task_id: &TaskId,
        entries: HashMap<String, String>,
    ) -> Result<Task, Error> {
        let _guard = self.lock_task(*task_id).await;
        let mut task = self.stores.tasks.get(task_id).await?;
        for (key, value) in entries {
            task.metadata.insert(key, value);
        }
        task.updated_at_ms = self.clock.epoch_ms();
        self.stores.tasks.put(&task).await?;
        self.bus.publish(&self.task_event(EventKind::TaskUpdated, &task));
        Ok(task)
    }

    /// Replace the task description (directive-driven) and publish
    /// `TaskUpdated`.
    pub async fn update_task_description(
        &self,
        task_id: &TaskId,
        description: String,
    ) -> Result<Task, Error> {
        let _guard = self.lock_task(*task_id).await;
        let mut task = self.stores.tasks.get(task_id).await?;
        task.description = description;
        task.updated_at_ms = self.clock.epoch_ms();
        self.stores.tasks.put(&task).await?;
        self.bus.publish(&self.task_event(EventKind::TaskUpdated, &task));
        Ok(task)
    }

    pub async fn delete_task(&self, task_id: &TaskId) -> Result<(), Error> {
        let _guard = self.lock_task(*task_id).await;
        let task = self.stores.tasks.get(task_id).await?;
        self.stores.tasks.delete(task_id).await?;
        self.bus.publish(&self.task_event(EventKind::TaskDeleted, &task));
        Ok(())
    }

    /// Move a task through the status graph.
    ///
    /// Without `force`, the move must be one of the current status's
    /// allowed transitions. With `force`, the graph is bypassed — except
    /// that a task whose assignment is Pending or Assigned (an agent may be
    /// running) never moves.
    pub async fn update_task_status(
        &self,
        task_id: &TaskId,
        target: &StatusId,
        force: bool,
    ) -> Result<Task, Error> {
        let _guard = self.lock_task(*task_id).await;
        let mut task = self.stores.tasks.get(task_id).await?;
        let workflow = self.stores.workflows.get(&task.workflow_id).await?;

        let Some(target_status) = workflow.status(target) else {
            return Err(Error::invalid_argument(format!(
                "status '{}' does not exist in workflow {}",
                target, workflow.id
            )));
        };

        if force {
            if task.assignment_status.is_active() {
                return Err(Error::failed_precondition(format!(
                    "task {} is {} to a worker; cannot force status change",
                    task.id, task.assignment_status
                )));
            }
        } else {
            let current = workflow.status(&task.status_id).ok_or_else(|| {
                Error::failed_precondition(format!(
                    "task {} is in unknown status '{}'",
                    task.id, task.status_id
                ))
            })?;
            if !current.allows_transition_to(target) {
                return Err(Error::failed_precondition(format!(
                    "transition '{}' → '{}' is not allowed",
                    current.id, target
                )));
            }
        }

        task.status_id = target_status.id.clone();
        task.updated_at_ms = self.clock.epoch_ms();
        self.stores.tasks.put(&task).await?;

        tracing::info!(task = %task.id, status = %task.status_id, force, "task status changed");
        let event = self
            .task_event(EventKind::TaskStatusChanged, &task)
            .with_meta(meta_keys::NEW_STATUS_ID, target_status.id.to_string());
        self.bus.publish(&event);
        Ok(task)
    }

    /// Mark a task as offered to the fleet. Called by the orchestrator
    /// before it broadcasts availability. Tasks already claimed by a worker
    /// are left alone.
    pub async fn mark_pending(&self, task_id: &TaskId) -> Result<Option<Task>, Error> {
        let _guard = self.lock_task(*task_id).await;
        let mut task = self.stores.tasks.get(task_id).await?;
        if task.assignment_status == AssignmentStatus::Assigned {
            return Ok(None);
        }
        if task.assignment_status != AssignmentStatus::Pending {
            task.assignment_status = AssignmentStatus::Pending;
            task.updated_at_ms = self.clock.epoch_ms();
            self.stores.tasks.put(&task).await?;
        }
        Ok(Some(task))
    }

    /// First-writer-wins claim. Exactly one of any set of concurrent
    /// claimers succeeds; the rest get `success=false`.
    pub async fn claim_task(
        &self,
        task_id: &TaskId,
        worker_id: &WorkerId,
    ) -> Result<ClaimTaskResponse, Error> {
        let _guard = self.lock_task(*task_id).await;
        let mut task = self.stores.tasks.get(task_id).await?;

        if task.assignment_status != AssignmentStatus::Pending
            || task.assigned_worker_id.is_some()
        {
            tracing::debug!(task = %task.id, worker = %worker_id, "claim lost");
            return Ok(ClaimTaskResponse::lost());
        }

        let workflow = self.stores.workflows.get(&task.workflow_id).await?;
        let hooks = self.resolve_hooks(&workflow, &task.status_id).await;
        task.assignment_status = AssignmentStatus::Assigned;
        task.assigned_worker_id = Some(worker_id.clone());
        self.enrich_metadata(&mut task, &workflow, &hooks);
        task.updated_at_ms = self.clock.epoch_ms();
        self.stores.tasks.put(&task).await?;

        // A missing agent definition downgrades to an instruction-less
        // session rather than failing the claim.
        let instructions = match workflow.agent_for_status(&task.status_id) {
            Some(agent_id) => match self.stores.agents.get(&agent_id).await {
                Ok(agent) => Some(agent.content),
                Err(e) => {
                    tracing::warn!(task = %task.id, agent = %agent_id, error = %e, "agent lookup failed");
                    None
                }
            },
            None => None,
        };

        tracing::info!(task = %task.id, worker = %worker_id, "task claimed");
        let event = self
            .task_event(EventKind::AgentAssigned, &task)
            .with_meta(meta_keys::WORKER_ID, worker_id.to_string());
        self.bus.publish(&event);

        Ok(ClaimTaskResponse {
            success: true,
            instructions,
            metadata: task.metadata.clone(),
        })
    }

    /// The current status's hooks with skill name/content filled in, so
    /// workers need no skill lookups.
    async fn resolve_hooks(
        &self,
        workflow: &Workflow,
        status_id: &StatusId,
    ) -> Vec<toil_core::Hook> {
        let Some(status) = workflow.status(status_id) else {
            return Vec::new();
        };
        let mut resolved = Vec::with_capacity(status.hooks.len());
        for hook in &status.hooks {
            let mut hook = hook.clone();
            if hook.content.is_empty() {
                match self.stores.skills.get(&hook.skill_id).await {
                    Ok(skill) => {
                        hook.name = skill.name;
                        hook.content = skill.content;
                    }
                    Err(e) => {
                        tracing::warn!(
                            skill = %hook.skill_id,
                            error = %e,
                            "hook skill lookup failed"
                        );
                    }
                }
            }
            resolved.push(hook);
        }
        resolved
    }

    /// Stamp reserved metadata so the session driver needs no follow-up
    /// reads: title, description, status name, available transitions,
    /// worktree flag, permission mode, and the current status's hooks.
    fn enrich_metadata(&self, task: &mut Task, workflow: &Workflow, hooks: &[toil_core::Hook]) {
        task.set_meta(meta::TASK_TITLE, task.title.clone());
        task.set_meta(meta::TASK_DESCRIPTION, task.description.clone());
        if let Some(status) = workflow.status(&task.status_id) {
            task.set_meta(meta::CURRENT_STATUS_NAME, status.name.clone());
        }
        if let Ok(json) = serde_json::to_string(hooks) {
            task.set_meta(meta::HOOKS, json);
        }
        let transitions = workflow.transitions_from(&task.status_id);
        if let Ok(json) = serde_json::to_string(&transitions) {
            task.set_meta(meta::AVAILABLE_TRANSITIONS, json);
        }
        task.set_meta(meta::USE_WORKTREE, if task.use_worktree { "true" } else { "false" });
        task.set_meta(meta::PERMISSION_MODE, task.permission_mode.as_str());
    }

    /// Record the terminal outcome of a session run and release the task
    /// back to the orchestrator.
    pub async fn report_task_result(
        &self,
        request: &ReportTaskResultRequest,
    ) -> Result<Task, Error> {
        let _guard = self.lock_task(request.task_id).await;
        let mut task = self.stores.tasks.get(&request.task_id).await?;

        task.set_meta(meta::RESULT_STATUS, request.status.as_str());
        task.set_meta(meta::RESULT_SUMMARY, request.summary.clone());
        if let Some(error) = &request.error {
            task.set_meta(meta::RESULT_ERROR, error.clone());
        } else {
            task.metadata.remove(meta::RESULT_ERROR);
        }
        task.assigned_worker_id = None;
        task.assignment_status = AssignmentStatus::Unassigned;
        task.updated_at_ms = self.clock.epoch_ms();
        self.stores.tasks.put(&task).await?;

        tracing::info!(
            task = %task.id,
            worker = %request.worker_id,
            status = request.status.as_str(),
            "task result reported"
        );
        let event = self
            .task_event(EventKind::TaskUpdated, &task)
            .with_meta(meta_keys::RESULT_STATUS, request.status.as_str());
        self.bus.publish(&event);
        Ok(task)
    }

    /// Fan out a worker-side agent state change.
    pub async fn report_agent_status(
        &self,
        request: &ReportAgentStatusRequest,
    ) -> Result<(), Error> {
        let task = self.stores.tasks.get(&request.task_id).await?;
        let status = match request.status {
            AgentStatus::Idle => "idle",
            AgentStatus::Running => "running",
            AgentStatus::Error => "error",
        };
        let mut event = self
            .task_event(EventKind::AgentStatusChanged, &task)
            .with_meta(meta_keys::WORKER_ID, request.worker_id.clone())
            .with_meta("agent_status", status);
        if let Some(message) = &request.message {
            event = event.with_payload(serde_json::json!({ "message": message }));
        }
        self.bus.publish(&event);
        Ok(())
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
