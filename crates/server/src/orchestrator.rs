// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch orchestrator: turns task lifecycle events into availability
//! offers.
//!
//! The orchestrator never assigns work directly. It marks the task Pending
//! and broadcasts `TaskAvailable` to the task's project; workers race to
//! claim, and the task service arbitrates first-writer-wins. A worker dying
//! between offer and claim therefore loses nothing — the next status event
//! re-offers.

use crate::bus::EventBus;
use crate::registry::WorkerRegistry;
use crate::tasks::TaskService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toil_core::{Clock, Error, Event, EventKind, TaskId};
use toil_storage::Stores;
use toil_wire::AgentCommand;

/// Buffer for the orchestrator's own bus subscription.
const EVENT_BUFFER: usize = 256;

pub struct Orchestrator<C: Clock> {
    stores: Stores,
    bus: EventBus,
    registry: Arc<WorkerRegistry<C>>,
    tasks: Arc<TaskService<C>>,
}

impl<C: Clock> Orchestrator<C> {
    pub fn new(
        stores: Stores,
        bus: EventBus,
        registry: Arc<WorkerRegistry<C>>,
        tasks: Arc<TaskService<C>>,
    ) -> Self {
        Self { stores, bus, registry, tasks }
    }

    /// Subscribe to the bus and dispatch until cancelled.
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()>
    where
        C: 'static,
    {
        let (subscriber, mut events) = self.bus.subscribe(EVENT_BUFFER);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        if let Err(e) = self.handle_event(&event).await {
                            tracing::warn!(
                                kind = ?event.kind,
                                resource = %event.resource_id,
                                error = %e,
                                "dispatch failed"
                            );
                        }
                    }
                }
            }
            self.bus.unsubscribe(subscriber);
            tracing::info!("orchestrator stopped");
        })
    }

    /// Handle one lifecycle event. Only `TaskCreated` and
    /// `TaskStatusChanged` trigger dispatch.
    pub async fn handle_event(&self, event: &Event) -> Result<(), Error> {
        match event.kind {
            EventKind::TaskCreated | EventKind::TaskStatusChanged => {}
            _ => return Ok(()),
        }
        let task_id = TaskId::from_string(&event.resource_id);
        self.offer_task(&task_id).await
    }

    /// Resolve the task's agent config and broadcast availability.
    pub async fn offer_task(&self, task_id: &TaskId) -> Result<(), Error> {
        let task = self.stores.tasks.get(task_id).await?;
        let workflow = self.stores.workflows.get(&task.workflow_id).await?;

        // Statuses without an agent binding are manual or terminal; the
        // task waits for a human there.
        let Some(agent_config_id) = workflow.agent_for_status(&task.status_id) else {
            tracing::debug!(task = %task.id, status = %task.status_id, "no agent for status");
            return Ok(());
        };

        let Some(task) = self.tasks.mark_pending(task_id).await? else {
            tracing::debug!(task = %task_id, "already assigned, not re-offering");
            return Ok(());
        };

        let project = self.stores.projects.get(&task.project_id).await?;
        let command = AgentCommand::TaskAvailable {
            task_id: task.id,
            agent_config_id: Some(agent_config_id),
            title: task.title.clone(),
            metadata: task.metadata.clone(),
        };
        let reached = self.registry.broadcast_command_to_project(&project.name, command);
        tracing::info!(
            task = %task.id,
            project = %project.name,
            workers = reached,
            "task offered"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
