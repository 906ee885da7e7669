// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed entity stores over the storage port.
//!
//! Every store serializes records as JSON under a type-named key prefix.
//! `get` maps a missing key to the domain `NotFound`; `list` returns
//! records in key order (creation order, since ids are ULIDs).

use crate::port::{StorageError, StoragePort};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use toil_core::{
    AgentDef, AgentDefId, Error, Interaction, InteractionId, PermissionSet, Project, ProjectId,
    ScriptDef, ScriptDefId, SkillDef, SkillDefId, Task, TaskId, TaskLog, TaskLogId, Workflow,
    WorkflowId,
};

async fn read_json<T: DeserializeOwned>(
    port: &dyn StoragePort,
    key: &str,
) -> Result<T, StorageError> {
    let data = port.read(key).await?;
    serde_json::from_slice(&data).map_err(|e| StorageError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

async fn write_json<T: Serialize>(
    port: &dyn StoragePort,
    key: &str,
    record: &T,
) -> Result<(), StorageError> {
    let data = serde_json::to_vec_pretty(record).map_err(|e| StorageError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    port.write(key, &data).await
}

async fn list_json<T: DeserializeOwned>(
    port: &dyn StoragePort,
    prefix: &str,
) -> Result<Vec<T>, StorageError> {
    let keys = port.list(prefix).await?;
    let mut records = Vec::with_capacity(keys.len());
    for key in keys {
        match read_json(port, &key).await {
            Ok(record) => records.push(record),
            // A record deleted between list and read is not an error.
            Err(StorageError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(records)
}

macro_rules! entity_store {
    (
        $(#[$meta:meta])*
        $store:ident, $record:ty, $id:ty, $prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $store {
            port: Arc<dyn StoragePort>,
        }

        impl $store {
            pub fn new(port: Arc<dyn StoragePort>) -> Self {
                Self { port }
            }

            fn key(id: &$id) -> String {
                format!(concat!($prefix, "/{}"), id)
            }

            pub async fn get(&self, id: &$id) -> Result<$record, Error> {
                Ok(read_json(self.port.as_ref(), &Self::key(id)).await?)
            }

            pub async fn put(&self, record: &$record) -> Result<(), Error> {
                Ok(write_json(self.port.as_ref(), &Self::key(&record.id), record).await?)
            }

            pub async fn delete(&self, id: &$id) -> Result<(), Error> {
                Ok(self.port.delete(&Self::key(id)).await?)
            }

            pub async fn list(&self) -> Result<Vec<$record>, Error> {
                Ok(list_json(self.port.as_ref(), $prefix).await?)
            }

            pub async fn exists(&self, id: &$id) -> Result<bool, Error> {
                Ok(self.port.exists(&Self::key(id)).await?)
            }
        }
    };
}

entity_store! {
    /// Store for [`Project`] records under `projects/`.
    ProjectStore, Project, ProjectId, "projects"
}

entity_store! {
    /// Store for [`Workflow`] records under `workflows/`.
    WorkflowStore, Workflow, WorkflowId, "workflows"
}

entity_store! {
    /// Store for [`Task`] records under `tasks/`.
    TaskStore, Task, TaskId, "tasks"
}

entity_store! {
    /// Store for [`Interaction`] records under `interactions/`.
    InteractionStore, Interaction, InteractionId, "interactions"
}

entity_store! {
    /// Store for [`AgentDef`] records under `agents/`.
    AgentDefStore, AgentDef, AgentDefId, "agents"
}

entity_store! {
    /// Store for [`SkillDef`] records under `skills/`.
    SkillStore, SkillDef, SkillDefId, "skills"
}

entity_store! {
    /// Store for [`ScriptDef`] records under `scripts/`.
    ScriptStore, ScriptDef, ScriptDefId, "scripts"
}

entity_store! {
    /// Store for [`TaskLog`] records under `task_logs/`.
    TaskLogStore, TaskLog, TaskLogId, "task_logs"
}

impl InteractionStore {
    /// All interactions belonging to one task, in creation order.
    pub async fn list_for_task(&self, task_id: &TaskId) -> Result<Vec<Interaction>, Error> {
        let all = self.list().await?;
        Ok(all.into_iter().filter(|i| &i.task_id == task_id).collect())
    }
}

impl TaskLogStore {
    /// All log records for one task, in creation order.
    pub async fn list_for_task(&self, task_id: &TaskId) -> Result<Vec<TaskLog>, Error> {
        let all = self.list().await?;
        Ok(all.into_iter().filter(|l| &l.task_id == task_id).collect())
    }
}

/// Store for per-project [`PermissionSet`] records under `permissions/`.
///
/// Keyed by project id rather than a generated id, and a missing record
/// reads as the empty set: a project without stored rules allows nothing
/// extra.
#[derive(Clone)]
pub struct PermissionStore {
    port: Arc<dyn StoragePort>,
}

impl PermissionStore {
    pub fn new(port: Arc<dyn StoragePort>) -> Self {
        Self { port }
    }

    fn key(project_id: &ProjectId) -> String {
        format!("permissions/{}", project_id)
    }

    pub async fn get(&self, project_id: &ProjectId) -> Result<PermissionSet, Error> {
        match read_json(self.port.as_ref(), &Self::key(project_id)).await {
            Ok(set) => Ok(set),
            Err(StorageError::NotFound(_)) => Ok(PermissionSet::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn put(&self, project_id: &ProjectId, set: &PermissionSet) -> Result<(), Error> {
        Ok(write_json(self.port.as_ref(), &Self::key(project_id), set).await?)
    }
}

/// All entity stores bundled over one port.
#[derive(Clone)]
pub struct Stores {
    pub projects: ProjectStore,
    pub workflows: WorkflowStore,
    pub tasks: TaskStore,
    pub interactions: InteractionStore,
    pub agents: AgentDefStore,
    pub skills: SkillStore,
    pub scripts: ScriptStore,
    pub task_logs: TaskLogStore,
    pub permissions: PermissionStore,
}

impl Stores {
    pub fn new(port: Arc<dyn StoragePort>) -> Self {
        Self {
            projects: ProjectStore::new(Arc::clone(&port)),
            workflows: WorkflowStore::new(Arc::clone(&port)),
            tasks: TaskStore::new(Arc::clone(&port)),
            interactions: InteractionStore::new(Arc::clone(&port)),
            agents: AgentDefStore::new(Arc::clone(&port)),
            skills: SkillStore::new(Arc::clone(&port)),
            scripts: ScriptStore::new(Arc::clone(&port)),
            task_logs: TaskLogStore::new(Arc::clone(&port)),
            permissions: PermissionStore::new(port),
        }
    }
}

#[cfg(test)]
#[path = "stores_tests.rs"]
mod tests;
