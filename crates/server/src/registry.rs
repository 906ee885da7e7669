// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of attached agent-manager workers.
//!
//! A worker lives here only while its command stream is open. Each entry
//! owns the sending half of the worker's outbound command channel; the
//! stream handler holds the receiving half. Re-registering the same worker
//! id drops the old sender, which the old handler observes as end-of-stream.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use toil_core::{Clock, WorkerId};
use toil_wire::AgentCommand;

/// Outbound command buffer per worker. Full buffers fail targeted sends
/// and drop droppable broadcast commands.
pub const COMMAND_BUFFER: usize = 64;

struct WorkerConn {
    max_concurrent: u32,
    active_count: u32,
    project_name: String,
    last_heartbeat_ms: u64,
    generation: u64,
    tx: mpsc::Sender<AgentCommand>,
}

/// Snapshot of one registered worker, for introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSnapshot {
    pub worker_id: WorkerId,
    pub max_concurrent: u32,
    pub active_count: u32,
    pub project_name: String,
    pub last_heartbeat_ms: u64,
}

/// A registration handle: the command receiver plus the generation used to
/// unregister exactly this registration (and not a successor).
pub struct Registration {
    pub commands: mpsc::Receiver<AgentCommand>,
    pub generation: u64,
}

pub struct WorkerRegistry<C: Clock> {
    workers: Mutex<HashMap<WorkerId, WorkerConn>>,
    next_generation: Mutex<u64>,
    clock: C,
}

impl<C: Clock> WorkerRegistry<C> {
    pub fn new(clock: C) -> Self {
        Self { workers: Mutex::new(HashMap::new()), next_generation: Mutex::new(0), clock }
    }

    /// Register a worker, replacing any prior registration with the same id.
    pub fn register(
        &self,
        worker_id: WorkerId,
        max_concurrent: u32,
        project_name: impl Into<String>,
    ) -> Registration {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let generation = {
            let mut next = self.next_generation.lock();
            *next += 1;
            *next
        };
        let conn = WorkerConn {
            max_concurrent: max_concurrent.max(1),
            active_count: 0,
            project_name: project_name.into(),
            last_heartbeat_ms: self.clock.epoch_ms(),
            generation,
            tx,
        };
        let replaced = self.workers.lock().insert(worker_id.clone(), conn).is_some();
        if replaced {
            tracing::info!(worker = %worker_id, "re-registration replaced prior connection");
        } else {
            tracing::info!(worker = %worker_id, max_concurrent, "worker registered");
        }
        Registration { commands: rx, generation }
    }

    /// Remove a worker if the generation still matches.
    ///
    /// The generation check keeps a stale stream handler (whose entry was
    /// already replaced by a re-registration) from tearing down its
    /// successor.
    pub fn unregister(&self, worker_id: &WorkerId, generation: u64) {
        let mut workers = self.workers.lock();
        if workers.get(worker_id).is_some_and(|c| c.generation == generation) {
            workers.remove(worker_id);
            tracing::info!(worker = %worker_id, "worker unregistered");
        }
    }

    /// Record a heartbeat. Returns false for unknown workers, which tells
    /// the caller to have the worker re-subscribe.
    pub fn update_heartbeat(&self, worker_id: &WorkerId, active_count: u32) -> bool {
        let mut workers = self.workers.lock();
        match workers.get_mut(worker_id) {
            Some(conn) => {
                conn.active_count = active_count;
                conn.last_heartbeat_ms = self.clock.epoch_ms();
                true
            }
            None => false,
        }
    }

    /// Non-blocking targeted send. False when the worker is unknown or its
    /// buffer is full.
    pub fn send_command(&self, worker_id: &WorkerId, command: AgentCommand) -> bool {
        let workers = self.workers.lock();
        let Some(conn) = workers.get(worker_id) else {
            return false;
        };
        match conn.tx.try_send(command) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(worker = %worker_id, error = %e, "targeted send failed");
                false
            }
        }
    }

    /// Broadcast to every worker. Returns the number of workers reached.
    pub fn broadcast_command(&self, command: AgentCommand) -> usize {
        self.broadcast_filtered(command, |_| true)
    }

    /// Broadcast to workers registered for `project_name`. Workers with an
    /// empty project name predate project scoping and also receive.
    pub fn broadcast_command_to_project(
        &self,
        project_name: &str,
        command: AgentCommand,
    ) -> usize {
        self.broadcast_filtered(command, |conn_project| {
            conn_project.is_empty() || conn_project == project_name
        })
    }

    fn broadcast_filtered(
        &self,
        command: AgentCommand,
        include: impl Fn(&str) -> bool,
    ) -> usize {
        let workers = self.workers.lock();
        let mut reached = 0;
        for (worker_id, conn) in workers.iter() {
            if !include(&conn.project_name) {
                continue;
            }
            match conn.tx.try_send(command.clone()) {
                Ok(()) => reached += 1,
                Err(e) => {
                    tracing::warn!(worker = %worker_id, error = %e, "broadcast send dropped");
                }
            }
        }
        reached
    }

    /// The live worker with the most free capacity, if any has room.
    pub fn find_available(&self) -> Option<WorkerId> {
        let workers = self.workers.lock();
        workers
            .iter()
            .filter(|(_, conn)| conn.active_count < conn.max_concurrent)
            .min_by_key(|(_, conn)| conn.active_count)
            .map(|(worker_id, _)| worker_id.clone())
    }

    pub fn is_registered(&self, worker_id: &WorkerId) -> bool {
        self.workers.lock().contains_key(worker_id)
    }

    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let workers = self.workers.lock();
        let mut list: Vec<_> = workers
            .iter()
            .map(|(worker_id, conn)| WorkerSnapshot {
                worker_id: worker_id.clone(),
                max_concurrent: conn.max_concurrent,
                active_count: conn.active_count,
                project_name: conn.project_name.clone(),
                last_heartbeat_ms: conn.last_heartbeat_ms,
            })
            .collect();
        list.sort_by(|a, b| a.worker_id.as_str().cmp(b.worker_id.as_str()));
        list
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
