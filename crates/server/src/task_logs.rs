// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only task logs reported by session drivers.

use crate::bus::EventBus;
use toil_core::event::meta_keys;
use toil_core::{Clock, Error, Event, EventKind, TaskId, TaskLog};
use toil_storage::Stores;
use toil_wire::ReportTaskLogRequest;

pub struct TaskLogService<C: Clock> {
    stores: Stores,
    bus: EventBus,
    clock: C,
}

impl<C: Clock> TaskLogService<C> {
    pub fn new(stores: Stores, bus: EventBus, clock: C) -> Self {
        Self { stores, bus, clock }
    }

    pub async fn append(&self, request: &ReportTaskLogRequest) -> Result<TaskLog, Error> {
        let task = self.stores.tasks.get(&request.task_id).await?;
        let log = TaskLog::new(
            request.task_id,
            request.level,
            request.message.clone(),
            self.clock.epoch_ms(),
        );
        self.stores.task_logs.put(&log).await?;

        let event = Event::new(EventKind::TaskLogAppended, log.id.to_string(), log.created_at_ms)
            .with_meta(meta_keys::PROJECT_ID, task.project_id.to_string())
            .with_meta(meta_keys::TASK_ID, task.id.to_string());
        self.bus.publish(&event);
        Ok(log)
    }

    pub async fn list_for_task(&self, task_id: &TaskId) -> Result<Vec<TaskLog>, Error> {
        self.stores.task_logs.list_for_task(task_id).await
    }
}

#[cfg(test)]
#[path = "task_logs_tests.rs"]
mod tests;
