// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture: real control-plane services plus a worker stack whose
//! unary RPCs are routed in-process instead of over HTTP.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toil_agent::control::ControlPlane;
use toil_agent::model::fake::FakeTurnRunner;
use toil_agent::model::TurnRunner;
use toil_agent::session::SessionDriver;
use toil_agent::{InteractionWaiter, PermissionCache};
use toil_core::{
    AgentDef, AgentDefId, Error, Interaction, InteractionStatus, Project, StatusId, SystemClock,
    Task, TaskId, WorkerId, Workflow,
};
use toil_server::{
    EventBus, InteractionService, Orchestrator, PermissionService, SyncService, TaskLogService,
    TaskService, WorkerRegistry,
};
use toil_storage::{LocalStore, StoragePort, Stores};
use toil_wire::{
    ClaimTaskResponse, CreateInteractionRequest, CreateTaskRequest, HeartbeatResponse,
    ReportAgentStatusRequest, ReportGitPullMainResultRequest,
    ReportScriptExecutionResultRequest, ReportScriptOutputChunkRequest, ReportTaskLogRequest,
    ReportTaskResultRequest, ReportWorktreeDeleteResultRequest, ReportWorktreeListRequest,
    SyncAgentsResponse, SyncPermissionsRequest, SyncPermissionsResponse, SyncScriptsResponse,
};

pub struct ControlPlaneFixture {
    pub _dir: tempfile::TempDir,
    pub stores: Stores,
    pub bus: EventBus,
    pub registry: Arc<WorkerRegistry<SystemClock>>,
    pub tasks: Arc<TaskService<SystemClock>>,
    pub interactions: Arc<InteractionService<SystemClock>>,
    pub permissions: Arc<PermissionService<SystemClock>>,
    pub project: Project,
    pub workflow: Workflow,
}

impl ControlPlaneFixture {
    /// Project "demo" with workflow Draft (initial, →Review), Review
    /// (→Done), Done (terminal); an agent bound to Draft and Review.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let port: Arc<dyn StoragePort> = Arc::new(LocalStore::new(dir.path()));
        let stores = Stores::new(port);
        let bus = EventBus::new();
        let clock = SystemClock;

        let project = toil_core::test_support::demo_project();
        let mut workflow = toil_core::test_support::three_status_workflow();
        workflow.project_id = project.id;

        let agent = AgentDef {
            id: AgentDefId::new(),
            name: "builder".to_string(),
            content: "You are a careful software engineer.".to_string(),
            created_at_ms: 1,
            updated_at_ms: 1,
        };
        workflow.statuses[0].agent_id = Some(agent.id);
        workflow.statuses[1].agent_id = Some(agent.id);

        stores.projects.put(&project).await.unwrap();
        stores.workflows.put(&workflow).await.unwrap();
        stores.agents.put(&agent).await.unwrap();

        let registry = Arc::new(WorkerRegistry::new(clock.clone()));
        let tasks = Arc::new(TaskService::new(stores.clone(), bus.clone(), clock.clone()));
        let interactions =
            Arc::new(InteractionService::new(stores.clone(), bus.clone(), clock.clone()));
        let permissions =
            Arc::new(PermissionService::new(stores.clone(), bus.clone(), clock));

        Self {
            _dir: dir,
            stores,
            bus,
            registry,
            tasks,
            interactions,
            permissions,
            project,
            workflow,
        }
    }

    pub fn spawn_orchestrator(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        Orchestrator::new(
            self.stores.clone(),
            self.bus.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.tasks),
        )
        .spawn(cancel)
    }

    pub async fn create_task(&self, title: &str) -> Task {
        self.tasks
            .create_task(CreateTaskRequest {
                project_id: self.project.id,
                workflow_id: self.workflow.id,
                title: title.to_string(),
                description: String::new(),
                status_id: None,
                metadata: HashMap::new(),
                use_worktree: false,
                permission_mode: Default::default(),
            })
            .await
            .unwrap()
    }

    /// In-process control-plane port for one worker identity.
    pub fn control_for(&self, worker_id: &str) -> Arc<LocalControl> {
        Arc::new(LocalControl {
            worker_id: worker_id.to_string(),
            tasks: Arc::clone(&self.tasks),
            interactions: Arc::clone(&self.interactions),
            permissions: Arc::clone(&self.permissions),
            sync: SyncService::new(self.stores.clone()),
            task_logs: TaskLogService::new(self.stores.clone(), self.bus.clone(), SystemClock),
        })
    }

    /// Feed terminal interaction states into a waiter, the way the
    /// worker's subscription pump does over the wire.
    pub fn spawn_interaction_pump(
        &self,
        waiter: Arc<InteractionWaiter>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let mut stream = self.interactions.subscribe(None);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    interaction = stream.recv() => {
                        let Some(interaction) = interaction else { break };
                        if interaction.status != InteractionStatus::Pending {
                            waiter.deliver(interaction);
                        }
                    }
                }
            }
        })
    }

}

/// A worker-side stack sharing one scripted model and waiter.
pub struct WorkerFixture {
    pub worker_id: String,
    pub control: Arc<LocalControl>,
    pub model: Arc<FakeTurnRunner>,
    pub waiter: Arc<InteractionWaiter>,
    pub cache: Arc<PermissionCache>,
    pub cancel: CancellationToken,
    pub work_dir: std::path::PathBuf,
}

impl WorkerFixture {
    pub fn new(fixture: &ControlPlaneFixture, worker_id: &str) -> Self {
        Self {
            worker_id: worker_id.to_string(),
            control: fixture.control_for(worker_id),
            model: Arc::new(FakeTurnRunner::new()),
            waiter: Arc::new(InteractionWaiter::new()),
            cache: Arc::new(PermissionCache::new("demo")),
            cancel: CancellationToken::new(),
            work_dir: std::env::temp_dir(),
        }
    }

    /// Claim and, on success, drive the task to completion.
    pub async fn claim_and_run(&self, task_id: TaskId) -> bool {
        let claim = self.control.claim_task(task_id).await.unwrap();
        if !claim.success {
            return false;
        }
        self.run_with(task_id, claim).await;
        true
    }

    pub async fn run_with(&self, task_id: TaskId, claim: ClaimTaskResponse) {
        let driver = SessionDriver {
            task_id,
            worker_id: self.worker_id.clone(),
            instructions: claim.instructions,
            metadata: claim.metadata,
            worktree: None,
            work_dir: self.work_dir.clone(),
            control: Arc::clone(&self.control) as Arc<dyn ControlPlane>,
            model: Arc::clone(&self.model) as Arc<dyn TurnRunner>,
            waiter: Arc::clone(&self.waiter),
            cache: Arc::clone(&self.cache),
            cancel: self.cancel.clone(),
        };
        driver.run().await;
    }
}

/// Routes the worker's unary RPCs straight into the services.
pub struct LocalControl {
    worker_id: String,
    tasks: Arc<TaskService<SystemClock>>,
    interactions: Arc<InteractionService<SystemClock>>,
    permissions: Arc<PermissionService<SystemClock>>,
    sync: SyncService,
    task_logs: TaskLogService<SystemClock>,
}

#[async_trait]
impl ControlPlane for LocalControl {
    async fn heartbeat(&self, _active_count: u32) -> Result<HeartbeatResponse, Error> {
        Ok(HeartbeatResponse { ok: true })
    }

    async fn claim_task(&self, task_id: TaskId) -> Result<ClaimTaskResponse, Error> {
        self.tasks.claim_task(&task_id, &WorkerId::new(&self.worker_id)).await
    }

    async fn report_task_result(&self, request: ReportTaskResultRequest) -> Result<(), Error> {
        self.tasks.report_task_result(&request).await?;
        self.interactions.expire_pending_by_task(&request.task_id).await?;
        Ok(())
    }

    async fn report_agent_status(
        &self,
        request: ReportAgentStatusRequest,
    ) -> Result<(), Error> {
        self.tasks.report_agent_status(&request).await
    }

    async fn report_task_log(&self, request: ReportTaskLogRequest) -> Result<(), Error> {
        self.task_logs.append(&request).await.map(|_| ())
    }

    async fn create_interaction(
        &self,
        request: CreateInteractionRequest,
    ) -> Result<Interaction, Error> {
        self.interactions.create(request).await
    }

    async fn update_task_metadata(
        &self,
        task_id: TaskId,
        metadata: HashMap<String, String>,
    ) -> Result<(), Error> {
        self.tasks.update_task_metadata(&task_id, metadata).await.map(|_| ())
    }

    async fn update_task_description(
        &self,
        task_id: TaskId,
        description: String,
    ) -> Result<(), Error> {
        self.tasks.update_task_description(&task_id, description).await.map(|_| ())
    }

    async fn update_task_status(
        &self,
        task_id: TaskId,
        status_id: StatusId,
    ) -> Result<(), Error> {
        self.tasks.update_task_status(&task_id, &status_id, false).await.map(|_| ())
    }

    async fn sync_agents(&self) -> Result<SyncAgentsResponse, Error> {
        self.sync.agents().await
    }

    async fn sync_permissions(
        &self,
        request: SyncPermissionsRequest,
    ) -> Result<SyncPermissionsResponse, Error> {
        self.permissions.sync(&request).await
    }

    async fn sync_scripts(&self) -> Result<SyncScriptsResponse, Error> {
        self.sync.scripts().await
    }

    async fn report_script_output(
        &self,
        _request: ReportScriptOutputChunkRequest,
    ) -> Result<(), Error> {
        Ok(())
    }

    async fn report_script_result(
        &self,
        _request: ReportScriptExecutionResultRequest,
    ) -> Result<(), Error> {
        Ok(())
    }

    async fn report_worktree_list(
        &self,
        _request: ReportWorktreeListRequest,
    ) -> Result<(), Error> {
        Ok(())
    }

    async fn report_worktree_delete(
        &self,
        _request: ReportWorktreeDeleteResultRequest,
    ) -> Result<(), Error> {
        Ok(())
    }

    async fn report_git_pull_main(
        &self,
        _request: ReportGitPullMainResultRequest,
    ) -> Result<(), Error> {
        Ok(())
    }
}
